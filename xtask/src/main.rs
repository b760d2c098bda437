#![deny(unused_must_use)]

use std::{env, path::PathBuf};

use xshell::cmd;

#[rustfmt::skip]
fn main() -> Result<(), anyhow::Error> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let args = args.iter().map(|s| &**s).collect::<Vec<_>>();

    match &args[..] {
        ["test"] => test_workspace(),
        ["sign", image, key_file, curve, load_address, version] =>
            sign_image(image, key_file, curve, load_address, version, None),
        ["sign", image, key_file, curve, load_address, version, recipient_pubkey] =>
            sign_image(image, key_file, curve, load_address, version, Some(recipient_pubkey)),
        _ => {
            println!("USAGE: cargo xtask test");
            println!("OR");
            println!("USAGE: cargo xtask sign <image> <key_file> <curve> <load_address> <version> [recipient_pubkey]");
            Ok(())
        }
    }
}

fn test_workspace() -> Result<(), anyhow::Error> {
    let _p = xshell::pushd(root_dir())?;
    cmd!("cargo test --workspace").run()?;
    Ok(())
}

fn sign_image(
    image: &&str,
    key_file: &&str,
    curve: &&str,
    load_address: &&str,
    version: &&str,
    recipient_pubkey: Option<&&str>,
) -> Result<(), anyhow::Error> {
    let _p = xshell::pushd(root_dir().join("rbsigner"))?;
    match recipient_pubkey {
        Some(recipient) => {
            cmd!("cargo run -- {image} {key_file} {curve} {load_address} {version} {recipient}").run()?;
        }
        None => {
            cmd!("cargo run -- {image} {key_file} {curve} {load_address} {version}").run()?;
        }
    }
    Ok(())
}

fn root_dir() -> PathBuf {
    let mut xtask_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    xtask_dir.pop();
    xtask_dir
}
