/// Defines a `const fn` that loses its `const` under loom, whose atomics have
/// no `const` constructors.
macro_rules! maybe_const_fn {
    (
        $(#[$($attr:tt)*])*
        $vis:vis const fn $name:ident($($args:tt)*) -> $ret:ty { $($body:tt)* }
    ) => {
        #[cfg(not(loom))]
        $(#[$($attr)*])* $vis const fn $name($($args)*) -> $ret { $($body)* }
        #[cfg(loom)]
        $(#[$($attr)*])* $vis fn $name($($args)*) -> $ret { $($body)* }
    };
}
