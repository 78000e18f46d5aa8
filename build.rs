use std::env;
use std::path::PathBuf;

const FIXTURE: &str = "native/fixture.c";

fn main() {
    println!("cargo:rerun-if-changed={}", FIXTURE);

    // The fixture is a shared object opened at test time, so only toolchains
    // that take unix-style shared library flags are supported.
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();
    if target_os == "windows" || target_env == "msvc" {
        println!("cargo:warning=native fixture not built for {}-{}", target_os, target_env);
        return;
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set by cargo"));
    let (link_flag, extension) = if target_os == "macos" {
        ("-dynamiclib", "dylib")
    } else {
        ("-shared", "so")
    };
    let output = out_dir.join(format!("libabicall_fixture.{}", extension));

    let compiler = cc::Build::new()
        .cargo_metadata(false)
        .opt_level(2)
        .get_compiler();

    let status = compiler
        .to_command()
        .arg(link_flag)
        .arg("-fPIC")
        .arg("-o")
        .arg(&output)
        .arg(FIXTURE)
        .status();

    match status {
        Ok(status) if status.success() => {
            println!("cargo:rustc-env=ABICALL_FIXTURE_LIB={}", output.display());
        }
        Ok(status) => println!("cargo:warning=native fixture build failed: {}", status),
        Err(err) => println!("cargo:warning=could not run C compiler: {}", err),
    }
}
