//! Macros for declaring action sets with less ceremony.

/// Declare an [`ActionSet`](crate::ActionSet) in one expression.
///
/// Each entry is `method: handler`; prefix it with `async` for handlers that
/// return a future. Expands to the builder calls and `build()`, so the result
/// is a `Result<ActionSet, FluxError>`.
///
/// # Example
///
/// ```ignore
/// use flummox::action_set;
///
/// let counter = action_set!("CounterActions", {
///     increment: |by: i64| Ok(Some(by)),
///     reset: |_: ()| Ok(Some(0)),
///     async load: |_: ()| async move { Ok::<_, anyhow::Error>(Some(fetch_count().await?)) },
/// })?;
/// ```
#[macro_export]
macro_rules! action_set {
    (@munch $builder:expr; ) => {
        $builder.build()
    };
    (@munch $builder:expr; async $method:ident : $handler:expr $(, $($rest:tt)*)?) => {
        $crate::action_set!(@munch $builder.async_action(stringify!($method), $handler); $($($rest)*)?)
    };
    (@munch $builder:expr; $method:ident : $handler:expr $(, $($rest:tt)*)?) => {
        $crate::action_set!(@munch $builder.action(stringify!($method), $handler); $($($rest)*)?)
    };
    ($name:expr, { $($body:tt)* }) => {
        $crate::action_set!(@munch $crate::ActionSet::builder($name); $($body)*)
    };
}
