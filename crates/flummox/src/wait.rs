//! Arguments accepted by `wait_for`: stores, raw tokens, or sequences of either.

use smallvec::SmallVec;

use crate::dispatch::DispatchToken;
use crate::store::StoreRef;

/// One thing to wait for.
#[derive(Debug, Clone)]
pub enum WaitTarget {
    Token(DispatchToken),
    Store(StoreRef),
}

impl WaitTarget {
    /// Stores resolve to the token their handler was registered under.
    pub fn token(&self) -> DispatchToken {
        match self {
            WaitTarget::Token(token) => *token,
            WaitTarget::Store(store) => store.token(),
        }
    }
}

impl From<DispatchToken> for WaitTarget {
    fn from(token: DispatchToken) -> Self {
        WaitTarget::Token(token)
    }
}

impl From<&DispatchToken> for WaitTarget {
    fn from(token: &DispatchToken) -> Self {
        WaitTarget::Token(*token)
    }
}

impl From<StoreRef> for WaitTarget {
    fn from(store: StoreRef) -> Self {
        WaitTarget::Store(store)
    }
}

impl From<&StoreRef> for WaitTarget {
    fn from(store: &StoreRef) -> Self {
        WaitTarget::Store(store.clone())
    }
}

/// An ordered list of [`WaitTarget`]s. Order is preserved all the way down to
/// the dispatch channel.
#[derive(Debug, Clone, Default)]
pub struct WaitTargets(SmallVec<[WaitTarget; 4]>);

impl WaitTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target: impl Into<WaitTarget>) {
        self.0.push(target.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self) -> SmallVec<[DispatchToken; 4]> {
        self.0.iter().map(WaitTarget::token).collect()
    }
}

impl From<WaitTarget> for WaitTargets {
    fn from(target: WaitTarget) -> Self {
        Self(smallvec::smallvec![target])
    }
}

impl From<DispatchToken> for WaitTargets {
    fn from(token: DispatchToken) -> Self {
        WaitTarget::from(token).into()
    }
}

impl From<&DispatchToken> for WaitTargets {
    fn from(token: &DispatchToken) -> Self {
        WaitTarget::from(token).into()
    }
}

impl From<StoreRef> for WaitTargets {
    fn from(store: StoreRef) -> Self {
        WaitTarget::from(store).into()
    }
}

impl From<&StoreRef> for WaitTargets {
    fn from(store: &StoreRef) -> Self {
        WaitTarget::from(store).into()
    }
}

impl<T: Into<WaitTarget>> From<Vec<T>> for WaitTargets {
    fn from(targets: Vec<T>) -> Self {
        targets.into_iter().collect()
    }
}

impl<T: Into<WaitTarget>, const N: usize> From<[T; N]> for WaitTargets {
    fn from(targets: [T; N]) -> Self {
        targets.into_iter().collect()
    }
}

impl<T: Clone + Into<WaitTarget>> From<&[T]> for WaitTargets {
    fn from(targets: &[T]) -> Self {
        targets.iter().cloned().collect()
    }
}

impl<T: Into<WaitTarget>> FromIterator<T> for WaitTargets {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
