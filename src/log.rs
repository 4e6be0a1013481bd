// Developer tracing, compiled in with the `show_lowering` / `show_codegen`
// cargo features. Disabled macros still type check their arguments.

#[cfg(feature = "show_lowering")]
macro_rules! lowering_log {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "[lowering]".bright_black(), format!($($arg)*));
    }};
}

#[cfg(not(feature = "show_lowering"))]
macro_rules! lowering_log {
    ($($arg:tt)*) => {{
        if false {
            eprintln!($($arg)*);
        }
    }};
}

#[cfg(feature = "show_codegen")]
macro_rules! codegen_log {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "[codegen]".bright_black(), format!($($arg)*));
    }};
}

#[cfg(not(feature = "show_codegen"))]
macro_rules! codegen_log {
    ($($arg:tt)*) => {{
        if false {
            eprintln!($($arg)*);
        }
    }};
}
