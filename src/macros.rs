/// Build a `Vec<SqlValue>` of positional parameters.
///
/// ```rust
/// use d1_orm::prelude::*;
///
/// let params = params![7, "alice", None::<i64>];
/// assert_eq!(params, vec![SqlValue::Int(7), SqlValue::Text("alice".into()), SqlValue::Null]);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::SqlValue::from($value)),+]
    };
}

/// Build `field__op = value` filter lookups for `filter_all`, `exclude_all` and `get`.
///
/// ```rust
/// use d1_orm::prelude::*;
///
/// let lookups = lookups![qty__gte = 0, active = true, id__in = vec![1, 2]];
/// assert_eq!(lookups[0].0, "qty__gte");
/// assert_eq!(lookups[2].1, FilterArg::Many(vec![SqlValue::Int(1), SqlValue::Int(2)]));
/// ```
#[macro_export]
macro_rules! lookups {
    ($($key:ident = $value:expr),* $(,)?) => {
        ::std::vec![$((::std::stringify!($key), $crate::FilterArg::from($value))),*]
    };
}

/// Build `field = value` assignments for `create`, `update` and `Record::new`.
///
/// ```rust
/// use d1_orm::prelude::*;
///
/// let values = assignments![name = "a", qty = 5];
/// assert_eq!(values[1], ("qty", SqlValue::Int(5)));
/// ```
#[macro_export]
macro_rules! assignments {
    ($($key:ident = $value:expr),* $(,)?) => {
        ::std::vec![$((::std::stringify!($key), $crate::SqlValue::from($value))),*]
    };
}
