//! `vcwallet` command line entry point.

mod output;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use eyre::{bail, eyre, Result, WrapErr};
use secrecy::SecretString;
use serde_json::Value;
use vcwallet_core::{
    ApprovalStatus, CredentialId, Decision, VerifiableCredential, WalletConfig, WalletController,
};

use crate::output::{print_json, CredentialView, IdentityView, PendingView};

/// Local verifiable-credential wallet.
///
/// Every command runs against the wallet under `<root>/vcwallet`. Commands
/// that read or change credentials unlock the wallet first.
#[derive(Parser, Debug)]
#[command(name = "vcwallet", version, about)]
struct Cli {
    /// Storage root. Defaults to the platform data directory.
    #[arg(long, env = "VCWALLET_ROOT", global = true)]
    root: Option<PathBuf>,

    /// TOML config file (root, KDF cost, extra issuers).
    #[arg(long, env = "VCWALLET_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Wallet passphrase. Prompted for when omitted.
    #[arg(long, env = "VCWALLET_PASSPHRASE", global = true, hide_env_values = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether the wallet exists and is unlocked.
    Status,
    /// Create the wallet and mint its DID.
    Init,
    /// List stored credentials.
    List,
    /// Show the wallet DID.
    Identity,
    /// Offer credentials from a JSON file (one document or an array).
    Offer {
        /// Path to the credential document(s).
        file: PathBuf,

        /// Accept every offered credential.
        #[arg(long, conflicts_with_all = ["reject", "accept_new"])]
        accept: bool,

        /// Reject every offered credential.
        #[arg(long, conflicts_with = "accept_new")]
        reject: bool,

        /// Accept new credentials and skip ones the wallet already holds.
        #[arg(long)]
        accept_new: bool,
    },
    /// Delete a stored credential.
    Delete {
        /// Credential id as printed by `list`.
        id: CredentialId,
    },
    /// Irrecoverably destroy the wallet.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
}

/// How `offer` settles the entries it enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfferPolicy {
    Preview,
    AcceptAll,
    RejectAll,
    AcceptNew,
}

impl OfferPolicy {
    const fn from_flags(accept: bool, reject: bool, accept_new: bool) -> Self {
        match (accept, reject, accept_new) {
            (true, _, _) => Self::AcceptAll,
            (_, true, _) => Self::RejectAll,
            (_, _, true) => Self::AcceptNew,
            _ => Self::Preview,
        }
    }

    const fn decision_for(self, status: ApprovalStatus) -> Option<Decision> {
        match (self, status) {
            (Self::Preview, _) => None,
            (Self::AcceptAll, _) | (Self::AcceptNew, ApprovalStatus::Pending) => {
                Some(Decision::Accept)
            }
            (Self::RejectAll | Self::AcceptNew, _) => Some(Decision::Reject),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => WalletConfig::load(path)?,
        None => WalletConfig::default(),
    };
    let root = resolve_root(cli.root.as_deref(), &config)?;
    tracing::debug!(root = %root.display(), "opening wallet");

    let wallet = WalletController::open(&root, config.kdf)
        .wrap_err_with(|| format!("opening wallet under {}", root.display()))?;
    let registry = config.registry();
    let passphrase = cli.passphrase;

    match cli.command {
        Command::Status => {
            print_json(&wallet.poll())?;
        }
        Command::Init => {
            let passphrase = read_passphrase(passphrase, true)?;
            wallet
                .initialize(&passphrase)
                .wrap_err("initializing wallet")?;
            let identity = wallet.identity()?;
            tracing::info!(did = identity.did(), "wallet created");
            print_json(&IdentityView::from(&identity))?;
        }
        Command::List => {
            unlock(&wallet, passphrase)?;
            let views: Vec<_> = wallet
                .refresh_credential_list()
                .wrap_err("reading credentials")?
                .iter()
                .map(|record| CredentialView::new(record, &registry))
                .collect();
            print_json(&views)?;
        }
        Command::Identity => {
            unlock(&wallet, passphrase)?;
            print_json(&IdentityView::from(&wallet.identity()?))?;
        }
        Command::Offer {
            file,
            accept,
            reject,
            accept_new,
        } => {
            let offered = read_offer(&file)?;
            unlock(&wallet, passphrase)?;
            let policy = OfferPolicy::from_flags(accept, reject, accept_new);

            let enqueued: Vec<_> = wallet.foyer().enqueue(offered).collect();
            let mut views = Vec::with_capacity(enqueued.len());
            for pending in enqueued {
                if let Some(decision) = policy.decision_for(pending.status) {
                    wallet.decide(pending.id, decision);
                }
                let settled = wallet.foyer().get(pending.id).unwrap_or(pending);
                views.push(PendingView::new(&settled, &registry));
            }
            print_json(&views)?;
        }
        Command::Delete { id } => {
            unlock(&wallet, passphrase)?;
            wallet
                .delete_credential(&id)
                .wrap_err_with(|| format!("deleting credential {id}"))?;
            tracing::info!(%id, "credential deleted");
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("reset destroys every credential and the wallet DID; pass --yes to confirm");
            }
            wallet.reset().wrap_err("resetting wallet")?;
            tracing::info!("wallet reset");
        }
    }

    Ok(())
}

/// `--root`/`VCWALLET_ROOT` first, then the config file, then the platform
/// data directory.
fn resolve_root(flag: Option<&Path>, config: &WalletConfig) -> Result<PathBuf> {
    if let Some(root) = flag.or(config.root.as_deref()) {
        return Ok(root.to_path_buf());
    }
    dirs::data_dir().ok_or_else(|| eyre!("no platform data directory; pass --root"))
}

fn read_passphrase(provided: Option<String>, confirm: bool) -> Result<SecretString> {
    let passphrase = match provided {
        Some(passphrase) => passphrase,
        None => {
            let first = rpassword::prompt_password("Passphrase: ")?;
            if confirm && rpassword::prompt_password("Confirm passphrase: ")? != first {
                bail!("passphrases do not match");
            }
            first
        }
    };
    if passphrase.is_empty() {
        bail!("passphrase must not be empty");
    }
    Ok(SecretString::from(passphrase))
}

fn unlock(wallet: &WalletController, passphrase: Option<String>) -> Result<()> {
    let passphrase = read_passphrase(passphrase, false)?;
    wallet.unlock(&passphrase).wrap_err("unlocking wallet")
}

fn read_offer(path: &Path) -> Result<Vec<VerifiableCredential>> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    parse_offer(&text).wrap_err_with(|| format!("parsing {}", path.display()))
}

fn parse_offer(text: &str) -> Result<Vec<VerifiableCredential>> {
    let documents = match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => items,
        single => vec![single],
    };
    documents
        .into_iter()
        .enumerate()
        .map(|(index, document)| {
            serde_json::from_value(document)
                .wrap_err_with(|| format!("credential #{index} is not a verifiable credential"))
        })
        .collect()
}
