use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use zeroize::Zeroize;

use ssops_core::recipient::{self, RecipientDescriptor};
use ssops_core::{
    decrypt_from_artifact_json, encrypt_to_artifact_json, write_atomic, Error, KeyStore,
    MethodFile, PassphraseSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "ssops: multi-recipient secret sharing")]
struct Cli {
    /// Print the full error cause chain instead of a one-line message.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Encrypt stdin/a file for every recipient in a method file.
    Encrypt {
        method_file: PathBuf,
        #[arg(short = 'f', long = "filter")]
        name: Option<String>,
        #[arg(short, long, default_value = "-")]
        input: String,
        #[arg(short, long, default_value = "-")]
        output: String,
    },
    /// Decrypt an artifact, trying the local key store in artifact order.
    Decrypt {
        #[arg(short = 'f', long = "filter")]
        name: Option<String>,
        #[arg(short, long, default_value = "-")]
        input: String,
        #[arg(short, long, default_value = "-")]
        output: String,
    },
    /// Key store management (`<home>/.ssops`).
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Method file management.
    Method {
        method_file: PathBuf,
        #[command(subcommand)]
        action: MethodAction,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Generate an RSA keypair and store it under `name`.
    Gen {
        name: String,
        #[arg(short = 't', long = "type", default_value = "rsa")]
        key_type: String,
        /// Protect the private key with this SSH public key instead of a passphrase.
        #[arg(long)]
        ssh: Option<PathBuf>,
    },
    /// Confirm a stored private key unwraps (prompts for its protection).
    Check { name: String },
    /// Rewrap a stored private key under a new protection.
    Protect {
        name: String,
        #[arg(long)]
        ssh: Option<PathBuf>,
    },
    /// List key names present in the store.
    List,
}

#[derive(Subcommand, Debug)]
enum MethodAction {
    /// Write an empty method file.
    Create,
    /// Render the method file's recipients as a table.
    Show,
    /// Add a key-store recipient by name.
    AddKey {
        name: String,
        #[arg(short = 'e', long = "embed")]
        embed: bool,
    },
    /// Import an authorized-keys RSA line as a recipient.
    AddSshKey { public_key: PathBuf },
}

struct TerminalPrompt;

impl PassphraseSource for TerminalPrompt {
    fn read(&self, prompt: &str) -> ssops_core::Result<String> {
        rpassword::prompt_password(prompt)
            .map_err(|e| Error::ConfigInvalid(format!("reading passphrase: {e}")))
    }
}

fn main() {
    ssops_core::security::disable_core_dumps();

    let cli = Cli::parse();
    let debug = cli.debug;
    let level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<Error>() {
            Some(core_err) if debug => eprintln!("error: {}", core_err.debug_chain()),
            Some(core_err) => eprintln!("error: {}", core_err.terse()),
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.cmd {
        Cmd::Encrypt {
            method_file,
            name,
            input,
            output,
        } => cmd_encrypt(&method_file, name.as_deref(), &input, &output),
        Cmd::Decrypt {
            name,
            input,
            output,
        } => cmd_decrypt(name.as_deref(), &input, &output),
        Cmd::Key { action } => cmd_key(action),
        Cmd::Method {
            method_file,
            action,
        } => cmd_method(&method_file, action),
    }
}

fn read_input(spec: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if spec == "-" {
        std::io::stdin().read_to_end(&mut buf)?;
    } else {
        buf = std::fs::read(spec).with_context(|| format!("reading {spec}"))?;
    }
    Ok(buf)
}

fn write_output(spec: &str, bytes: &[u8]) -> Result<()> {
    if spec == "-" {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        lock.write_all(bytes)?;
        lock.flush()?;
    } else {
        write_atomic(Path::new(spec), bytes)?;
    }
    Ok(())
}

fn cmd_encrypt(method_file: &Path, name: Option<&str>, input: &str, output: &str) -> Result<()> {
    let plaintext = read_input(input)?;
    let artifact_json = encrypt_to_artifact_json(method_file, &plaintext, name)?;
    write_output(output, &artifact_json)?;
    Ok(())
}

fn cmd_decrypt(name: Option<&str>, input: &str, output: &str) -> Result<()> {
    let artifact_json = read_input(input)?;
    let keystore = KeyStore::open_default().ok();
    let plaintext =
        decrypt_from_artifact_json(&artifact_json, keystore.as_ref(), &TerminalPrompt, name)?;
    write_output(output, &plaintext)?;
    Ok(())
}

fn cmd_key(action: KeyAction) -> Result<()> {
    let store = KeyStore::open_default()?;
    match action {
        KeyAction::Gen {
            name,
            key_type,
            ssh,
        } => {
            if key_type != "rsa" {
                bail!("unsupported key type {key_type:?}; only \"rsa\" is implemented");
            }
            let (sk, pk) = recipient::generate_keypair()?;
            let mut der = recipient::private_key_to_pkcs8_der(&sk)?;
            let protected = match ssh {
                Some(ssh_path) => ssops_core::protector::wrap_ssh_agent(&name, &der, &ssh_path)?,
                None => ssops_core::protector::wrap_passphrase(&name, &der, &TerminalPrompt)?,
            };
            der.zeroize();
            let public_pem = recipient::public_key_to_pem(&pk)?;
            store.write_keypair(&name, &protected, &public_pem, false)?;
            println!("generated key {name}");
        }
        KeyAction::Check { name } => {
            let record = store.read_private_key(&name)?;
            ssops_core::protector::unwrap(&record, &TerminalPrompt)?;
            println!("{name}: ok");
        }
        KeyAction::Protect { name, ssh } => {
            let record = store.read_private_key(&name)?;
            let mut der = ssops_core::protector::unwrap(&record, &TerminalPrompt)?;
            let public_pem = store.read_public_key(&name)?;
            let rewrapped = match ssh {
                Some(ssh_path) => ssops_core::protector::wrap_ssh_agent(&name, &der, &ssh_path)?,
                None => ssops_core::protector::wrap_passphrase(&name, &der, &TerminalPrompt)?,
            };
            der.zeroize();
            store.write_keypair(&name, &rewrapped, &public_pem, true)?;
            println!("reprotected key {name}");
        }
        KeyAction::List => {
            for name in store.list()? {
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn cmd_method(method_file: &Path, action: MethodAction) -> Result<()> {
    match action {
        MethodAction::Create => {
            let method = MethodFile::new();
            method.save(method_file)?;
            println!("created {}", method_file.display());
        }
        MethodAction::Show => {
            let method = MethodFile::load(method_file)?;
            println!("{:<20} {:<8} embedded", "name", "kind");
            for (name, kind, embedded) in method.rows() {
                let embedded = if embedded { "yes" } else { "no" };
                println!("{name:<20} {kind:<8} {embedded}");
            }
        }
        MethodAction::AddKey { name, embed } => {
            let store = KeyStore::open_default()?;
            let public_key = store.read_public_key(&name)?;
            let encrypted_private_key = if embed {
                Some(store.read_private_key(&name)?)
            } else {
                None
            };
            let mut method = MethodFile::load(method_file)?;
            method.add(RecipientDescriptor {
                kind: "rsa".to_string(),
                name: name.clone(),
                public_key,
                encrypted_private_key,
            })?;
            method.save(method_file)?;
            println!("added {name}");
        }
        MethodAction::AddSshKey { public_key } => {
            let mut method = MethodFile::load(method_file)?;
            method.add_ssh_key(&public_key)?;
            method.save(method_file)?;
            println!("added ssh key {}", public_key.display());
        }
    }
    Ok(())
}
