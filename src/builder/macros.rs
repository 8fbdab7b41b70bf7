//! Macros for building handler arguments.

/// Build an argument vector of `serde_json::Value`s.
///
/// Each argument is a single token tree handed to `serde_json::json!`, so
/// literals, `null`, arrays and objects work as-is; wrap anything longer
/// (including negative numbers) in parentheses.
///
/// # Example
///
/// ```
/// use queued_fsm::fsm_args;
/// use serde_json::json;
///
/// let args = fsm_args!["b", "test", 22, null, [1, 2], (-3)];
/// assert_eq!(
///     args,
///     vec![json!("b"), json!("test"), json!(22), json!(null), json!([1, 2]), json!(-3)]
/// );
/// ```
#[macro_export]
macro_rules! fsm_args {
    () => {
        ::std::vec::Vec::<$crate::__private::Value>::new()
    };
    ($($arg:tt),+ $(,)?) => {
        ::std::vec![$($crate::__private::json!($arg)),+]
    };
}
