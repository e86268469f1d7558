use std::{env, path::PathBuf};

fn main() {
    // OUT_DIR is ".../target[/{triple}]/{profile}/build/<pkg>-<hash>/out".
    // Walk up to the profile directory; the integration tests stage their
    // fixture libraries next to the other build artifacts there.
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    let profile = env::var("PROFILE").unwrap();

    let profile_dir = out_dir
        .ancestors()
        .find(|dir| dir.file_name().is_some_and(|name| name == &*profile))
        .expect("OUT_DIR does not contain a profile directory");

    println!(
        "cargo:rustc-env=LIBRELOAD_PROFILE_DIR={}",
        profile_dir.display()
    );

    println!("cargo:rerun-if-changed-env=OUT_DIR");
    println!("cargo:rerun-if-changed-env=PROFILE");
}
