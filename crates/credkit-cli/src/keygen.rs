use std::path::Path;

use clap::Args;

use credkit::keys::{self, KeyType};
use credkit::persist::{FileStore, LocalFileStore};

#[derive(Args)]
pub struct KeygenArgs {
    /// File name for the private key; the public key gets a `.pub` suffix
    #[arg(long)]
    pub name: String,

    /// Output directory for key files
    #[arg(long, default_value = ".")]
    pub output_dir: String,

    /// Key algorithm
    #[arg(long, default_value = "ed25519", value_parser = ["ed25519", "ecdsa", "rsa"])]
    pub key_type: String,

    /// Comment stored in the public key
    #[arg(long)]
    pub comment: Option<String>,
}

pub fn run(args: KeygenArgs) -> anyhow::Result<()> {
    let key_type: KeyType = args.key_type.parse()?;
    let mut key = keys::generate_private_key(key_type)?;
    if let Some(comment) = &args.comment {
        key.set_comment(comment.as_str());
    }

    let out_dir = Path::new(&args.output_dir);
    let store = LocalFileStore;
    let priv_path = out_dir.join(&args.name);
    let pub_path = out_dir.join(format!("{}.pub", args.name));

    let pem = keys::private_key_to_openssh(&key)?;
    store.write_atomic(&priv_path, pem.as_bytes(), 0o600)?;
    let public = format!("{}\n", key.public_key().to_openssh()?);
    store.write_atomic(&pub_path, public.as_bytes(), 0o644)?;

    eprintln!(
        "Generated {} keypair ({})",
        args.key_type,
        keys::fingerprint(key.public_key())
    );
    eprintln!("  Private key: {}", priv_path.display());
    eprintln!("  Public key: {}", pub_path.display());
    Ok(())
}
