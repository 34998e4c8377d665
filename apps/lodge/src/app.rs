//! Wiring between configuration, credentials and the submission workflow.

use anyhow::Context;
use lodge_channel::ClientTls;
use lodge_identity::{IssueRequest, issue};
use lodge_submit::{ScpCopier, Submission, SubmissionOutcome, TlsDialer};
use lodge_transfer::Hasher;

use crate::cli::{KeygenArgs, ManifestArgs};
use crate::config::ClientConfig;

/// Everything needed to submit, built once per process.
pub struct Client {
    config: ClientConfig,
    dialer: TlsDialer,
    copier: ScpCopier,
}

impl Client {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let paths = config.credentials();
        let tls = ClientTls::load(&paths, &config.server_verification()).with_context(|| {
            format!(
                "loading credentials from {} (run `lodge keygen` first?)",
                paths.dir.display()
            )
        })?;
        let dialer = TlsDialer::new(config.addr(), tls).with_timeout(config.timeout());
        let copier = ScpCopier::with_program(&config.scp_program);
        Ok(Self {
            config,
            dialer,
            copier,
        })
    }

    /// Builds the manifest for `args` and runs one submission.
    pub async fn submit(&self, args: &ManifestArgs) -> anyhow::Result<SubmissionOutcome> {
        let mut hasher = Hasher::new(self.config.algorithm);
        let manifest = args.build(&mut hasher)?;
        let mut submission =
            Submission::new(manifest, &self.config.settings(), &self.dialer, &self.copier);
        let outcome = submission.run().await?;
        for line in &outcome.acknowledgement {
            println!("{line}");
        }
        Ok(outcome)
    }
}

/// Issues a client identity and tells the user what to hand the administrator.
pub fn keygen(config: &ClientConfig, args: &KeygenArgs) -> anyhow::Result<()> {
    let mut request = IssueRequest::new(args.user.clone(), &config.credentials_dir);
    request.organisation = args.org.clone();
    request.overwrite = args.force;

    let identity = issue(&request)?;
    println!("Submit this serial number and user name to the lodge administrator:");
    println!("Serial: {}", identity.serial);
    println!("Username: {}", identity.common_name);
    Ok(())
}

/// Prints manual copy commands to stderr.
pub fn print_instructions(instructions: &[String]) {
    if instructions.is_empty() {
        return;
    }
    eprintln!("Some copies failed. Complete the transfer by running:");
    for command in instructions {
        eprintln!("  {command}");
    }
}
