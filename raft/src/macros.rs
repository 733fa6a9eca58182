macro_rules! verbose {
    ($($arg:tt)*) => (
        log::trace!($($arg)*)
    );
}
