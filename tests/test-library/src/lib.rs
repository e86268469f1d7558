//! Fixture cdylib for the integration tests. The exported version number is
//! selected by the `v1`/`v2`/`v3` features so tests can observe reloads.

#[unsafe(no_mangle)]
extern "C" fn test_lib_version() -> u32 {
    #[cfg(feature = "v1")]
    return 1;
    #[cfg(feature = "v2")]
    return 2;
    #[cfg(feature = "v3")]
    return 3;
}

#[unsafe(no_mangle)]
extern "C" fn test_lib_add(a: i32, b: i32) -> i32 {
    a + b
}
