macro_rules! emit {
    ($generator:expr) => {
        $generator.line(format_args!(""))
    };

    ($generator:expr, $($format:tt)*) => {
        $generator.line(format_args!($($format)*))
    };
}
