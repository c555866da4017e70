//! Sigbox CLI — attested signing identity management
//!
//! Commands:
//!   sigbox init — generate a custodied key, export sealed state,
//!                 public key, and a verified attestation quote
//!   sigbox sign — sign a file with a key restored from sealed state

use sigbox::attestation::{AttestationCoordinator, QuotingAuthority, SoftwareAuthority};
use sigbox::custodian::SignatureScheme;
use sigbox::error::{Result, SigboxError};
use sigbox::session::{Session, SessionConfig};
use sigbox::store::{
    write_atomic, write_public_key, FileCallbacks, SealedStateStore, DEFAULT_PUBLIC_KEY_FILE,
    DEFAULT_QUOTE_FILE, DEFAULT_SEALED_STATE_FILE, DEFAULT_SIGNATURE_FILE,
};
use std::env;
use std::path::{Path, PathBuf};

const AUTHORITY_LABEL: &str = "sigbox";

fn print_usage() {
    println!(
        r#"
Sigbox — attested, hardware-custodied signing identity

Usage: sigbox <command> [options]

Commands:
  init <spid> <quote-type> [dir] [scheme]   Generate a key inside the trust
                                            boundary; write sealed state,
                                            public key, and quote into dir
  sign <data-file> [dir]                    Sign a file with the key restored
                                            from dir's sealed state

Arguments:
  spid        service-provider id, exactly 32 hex characters
  quote-type  'l'(inkable) or 'u'(nlinkable), case-insensitive
  dir         artifact directory (default: current directory)
  scheme      ed25519 (default) or p256

Examples:
  sigbox init 0123456789abcdef0123456789abcdef unlinkable
  sigbox init 0123456789abcdef0123456789abcdef l ./identity p256
  sigbox sign message.bin ./identity
"#
    );
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let outcome = match args[1].as_str() {
        "init" => cmd_init(&args[2..]),
        "sign" => cmd_sign(&args[2..]),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn artifact_dir(arg: Option<&String>) -> PathBuf {
    arg.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

fn parse_scheme(arg: Option<&String>) -> Result<SignatureScheme> {
    match arg.map(|s| s.as_str()) {
        None | Some("ed25519") => Ok(SignatureScheme::Ed25519),
        Some("p256") => Ok(SignatureScheme::EcdsaP256),
        Some(other) => Err(SigboxError::Configuration(format!(
            "unknown scheme '{other}', expected ed25519 or p256"
        ))),
    }
}

fn cmd_init(args: &[String]) -> Result<()> {
    // argument validation happens before any session is created
    let (spid, quote_type) = match (args.first(), args.get(1)) {
        (Some(spid), Some(quote_type)) => (spid, quote_type),
        _ => {
            eprintln!("Usage: sigbox init <spid> <quote-type> [dir] [scheme]");
            return Err(SigboxError::Configuration(
                "init requires a SPID and a quote type".into(),
            ));
        }
    };
    let dir = artifact_dir(args.get(2));
    let scheme = parse_scheme(args.get(3))?;
    std::fs::create_dir_all(&dir)?;

    let store = SealedStateStore::new(dir.join(DEFAULT_SEALED_STATE_FILE));
    if store.exists() {
        return Err(SigboxError::Configuration(format!(
            "{} already exists, refusing to overwrite an identity",
            store.path().display()
        )));
    }

    let config = SessionConfig {
        scheme,
        ..SessionConfig::default()
    };
    let mut session = Session::new(config, FileCallbacks::new(store, scheme));
    session.load()?;
    let public_key = session.initialize(None)?;

    let key_path = dir.join(DEFAULT_PUBLIC_KEY_FILE);
    write_public_key(&key_path, scheme, &public_key)?;
    println!("  Public key ({}): {}", scheme.name(), hex::encode(&public_key));
    println!("  Written to {}", key_path.display());

    let coordinator = AttestationCoordinator::new(SoftwareAuthority::new(AUTHORITY_LABEL));
    let mut quote = vec![0u8; coordinator.authority().quote_size()];
    let written = coordinator.obtain_quote(&mut session, spid, quote_type, &mut quote)?;
    quote.truncate(written);

    let quote_path = dir.join(DEFAULT_QUOTE_FILE);
    write_atomic(&quote_path, &quote)?;
    println!("  Quote ({} bytes) written to {}", written, quote_path.display());
    println!("  Sealed state in {}", dir.join(DEFAULT_SEALED_STATE_FILE).display());

    session.unload()
}

fn cmd_sign(args: &[String]) -> Result<()> {
    let data_path = match args.first() {
        Some(path) => Path::new(path),
        None => {
            eprintln!("Usage: sigbox sign <data-file> [dir]");
            return Err(SigboxError::Configuration(
                "sign requires a data file".into(),
            ));
        }
    };
    let dir = artifact_dir(args.get(1));

    let store = SealedStateStore::new(dir.join(DEFAULT_SEALED_STATE_FILE));
    if !store.exists() {
        return Err(SigboxError::Configuration(format!(
            "no sealed state at {}, run 'sigbox init' first",
            store.path().display()
        )));
    }
    let payload = std::fs::read(data_path)?;
    let sealed = store.read()?;
    let scheme = store
        .read_meta()
        .ok()
        .and_then(|meta| {
            [SignatureScheme::Ed25519, SignatureScheme::EcdsaP256]
                .into_iter()
                .find(|s| s.name() == meta.scheme)
        })
        .unwrap_or(SignatureScheme::Ed25519);

    let config = SessionConfig {
        scheme,
        ..SessionConfig::default()
    };
    let mut session = Session::new(config, FileCallbacks::new(store, scheme));
    session.load_with_state(&sealed)?;

    let signature = session.sign(&payload)?;
    let out_path = dir.join(DEFAULT_SIGNATURE_FILE);
    write_atomic(&out_path, &signature)?;
    println!(
        "  Signed {} ({} bytes) with {}",
        data_path.display(),
        payload.len(),
        scheme.name()
    );
    println!("  Signature written to {}", out_path.display());

    session.unload()
}
