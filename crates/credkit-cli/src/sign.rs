use std::fs;
use std::path::PathBuf;

use clap::Args;

use credkit::client::{deliver, issue};
use credkit::config::ClientConfig;
use credkit::keys::{self, KeyType};

#[derive(Args)]
pub struct SignArgs {
    /// JSON config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Signing authority URL
    #[arg(long)]
    pub ca: Option<String>,

    /// Requested certificate lifetime (e.g. "24h", "1h30m")
    #[arg(long)]
    pub validity: Option<String>,

    /// Principal to request the certificate for
    #[arg(long)]
    pub principal: Option<String>,

    /// Directory to save the key, public key and certificate into
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Skip TLS certificate verification (testing only)
    #[arg(long)]
    pub skip_tls_verify: bool,

    /// Bearer token for the authority
    #[arg(long, env = "CREDKIT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Existing private key to certify; a fresh key is generated otherwise
    #[arg(long)]
    pub private_key: Option<PathBuf>,

    /// Algorithm for a generated key
    #[arg(long, default_value = "ed25519", value_parser = ["ed25519", "ecdsa", "rsa"])]
    pub key_type: String,
}

/// Merge the config file (if any) with command-line overrides.
pub fn resolve_config(args: &SignArgs) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("Cannot load config {}: {}", path.display(), e))?,
        None => ClientConfig::default(),
    };
    if let Some(ca) = &args.ca {
        config.ca = ca.clone();
    }
    if args.validity.is_some() {
        config.validity = args.validity.clone();
    }
    if args.principal.is_some() {
        config.principal = args.principal.clone();
    }
    if args.prefix.is_some() {
        config.prefix = args.prefix.clone();
    }
    if args.skip_tls_verify {
        config.skip_tls_verify = true;
    }
    if args.token.is_some() {
        config.token = args.token.clone();
    }
    config.validate()?;
    Ok(config)
}

pub async fn run(args: SignArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let token = config
        .token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("A bearer token is required (--token or CREDKIT_TOKEN)"))?;

    let private_key = match &args.private_key {
        Some(path) => keys::load_private_key(&fs::read_to_string(path)?)?,
        None => {
            let key_type: KeyType = args.key_type.parse()?;
            keys::generate_private_key(key_type)?
        }
    };

    let pair = issue(private_key, &token, &config).await?;
    let cert = pair.certificate();
    eprintln!(
        "Received certificate '{}' (serial {}) for {}",
        cert.key_id(),
        cert.serial(),
        keys::fingerprint(pair.public_key())
    );

    if config.prefix.is_none() {
        println!("{}", cert.to_openssh());
        return Ok(());
    }

    let delivery = deliver(&pair, None, config.prefix_path());
    delivery.saved?;
    eprintln!(
        "Credentials written to {}",
        config.prefix_path().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SignArgs {
        SignArgs {
            config: None,
            ca: None,
            validity: None,
            principal: None,
            prefix: None,
            skip_tls_verify: false,
            token: None,
            private_key: None,
            key_type: "ed25519".to_string(),
        }
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credkit.json");
        fs::write(
            &path,
            r#"{"ca": "https://file.example.com", "validity": "12h", "principal": "alice"}"#,
        )
        .unwrap();

        let mut a = args();
        a.config = Some(path);
        a.validity = Some("1h".to_string());
        a.token = Some("t".to_string());

        let config = resolve_config(&a).unwrap();
        assert_eq!(config.ca, "https://file.example.com");
        assert_eq!(config.validity.as_deref(), Some("1h"));
        assert_eq!(config.principal.as_deref(), Some("alice"));
        assert_eq!(config.token.as_deref(), Some("t"));
        assert!(!config.skip_tls_verify);
    }

    #[test]
    fn test_missing_ca_rejected() {
        assert!(resolve_config(&args()).is_err());
    }

    #[test]
    fn test_missing_config_file_rejected() {
        let mut a = args();
        a.config = Some(PathBuf::from("/nonexistent/credkit.json"));
        a.ca = Some("https://ca.example.com".to_string());
        assert!(resolve_config(&a).is_err());
    }
}
