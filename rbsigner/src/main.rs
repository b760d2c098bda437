mod curve;
mod tlvsigner;

use curve::{import_signing_key, CurveType};
use tlvsigner::{sign_tlv_image, Version};

use std::env;
use std::fs;
use std::io::{Read, Write};

fn parse_version(s: &str) -> Version {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        panic!("version must be major.minor.revision.build, e.g. 1.0.0.0");
    }
    Version {
        major: parts[0].parse().expect("bad major version"),
        minor: parts[1].parse().expect("bad minor version"),
        revision: parts[2].parse().expect("bad revision"),
        build: parts[3].parse().expect("bad build"),
    }
}

fn parse_load_address(s: &str) -> u32 {
    match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).expect("bad load address"),
        None => s.parse().expect("bad load address"),
    }
}

fn read_recipient_pubkey(path: &str) -> [u8; 64] {
    let mut buf = Vec::new();
    fs::File::open(path)
        .expect("need path to recipient pubkey as argument")
        .read_to_end(&mut buf)
        .unwrap();
    if buf.len() != 64 {
        panic!("invalid recipient pubkey: length is not 64 bytes");
    }
    let mut pk = [0u8; 64];
    pk.copy_from_slice(&buf);
    pk
}

/// Usage:
///   rbsigner <image> <key_file> <curve> <load_address> <version> [recipient_pubkey]
///
/// `key_file` is a key blob with the raw signing key at offset `0x40`;
/// `version` is `major.minor.revision.build`; a `recipient_pubkey` (raw
/// 64-byte uncompressed X‖Y, the bootloader's ECDH public key) triggers
/// AES-CTR encryption of the image body for that recipient.
fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 6 {
        eprintln!(
            "usage: {} <image> <key_file> <curve> <load_address> <version> [recipient_pubkey]",
            args[0]
        );
        std::process::exit(1);
    }

    let mut key_file = Vec::new();
    fs::File::open(&args[2])
        .expect("need path to key_file as argument")
        .read_to_end(&mut key_file)
        .unwrap();

    let sk = match args[3].as_str() {
        "nistp256" => {
            let signing_key = &key_file.as_slice()[0x40..];
            if signing_key.len() != 32 {
                panic!("invalid nistp256 key: length is not 32 bytes");
            }
            import_signing_key(CurveType::NistP256, signing_key).unwrap()
        }
        other => panic!("unsupported curve: {}", other),
    };

    let mut image_blob = Vec::new();
    fs::File::open(&args[1])
        .expect("need path to image binary as argument")
        .read_to_end(&mut image_blob)
        .unwrap();

    let load_address = parse_load_address(&args[4]);
    let version = parse_version(&args[5]);
    let recipient_pub = args.get(6).map(|p| read_recipient_pubkey(p));

    let signed = sign_tlv_image(image_blob, load_address, version, sk, recipient_pub.as_ref())
        .expect("signing failed");

    let out_path = format!("{}.signed", args[1]);
    let mut out = fs::File::create(&out_path).expect("could not create output file");
    out.write_all(&signed).unwrap();
    println!("wrote {} ({} bytes)", out_path, signed.len());
}
