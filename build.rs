use anyhow::*;
use fs_extra::copy_items;
use fs_extra::dir::CopyOptions;
use std::env;
use std::path::PathBuf;

// Mirrors the asset folder next to the build output so demos started from
// `target/` still resolve relative texture and model references.
fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=assets/*");
    println!("cargo:rerun-if-env-changed=SCENE_NGIN_ASSETS");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let assets_src = match env::var("SCENE_NGIN_ASSETS") {
        std::result::Result::Ok(dir) => PathBuf::from(dir),
        Err(_) => manifest_dir.join("assets"),
    };
    if !assets_src.exists() {
        return Ok(());
    }

    let out_dir = env::var("OUT_DIR")?;
    let mut copy_options = CopyOptions::new();
    copy_options.overwrite = true;
    copy_items(&[assets_src], out_dir, &copy_options)?;

    Ok(())
}
