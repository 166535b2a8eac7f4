/// Build `Tags` from `key => value` pairs, the insertion order is kept.
#[macro_export]
macro_rules! tags {
    // Done without trailing comma
    ( $($x:expr => $y:expr),* ) => ({
        let mut _tags = $crate::tags::Tags::new();
        $(
            _tags.insert($x, $y);
        )*
        _tags
    });
    // Done with trailing comma
    ( $($x:expr => $y:expr,)* ) => (
        $crate::tags!{$($x => $y),*}
    );
}
