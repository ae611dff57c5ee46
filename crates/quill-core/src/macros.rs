/// Return early with an internal-consistency ("bug") error. These are
/// reachable only through evaluator defects, never through template content.
#[macro_export]
macro_rules! bail_bug {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::Bug(format!($($arg)*)))
    };
}
