fn main() {
    println!("Run `cargo test -p scenarios` to execute the end-to-end submission scenarios.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use lodge_channel::{
        Channel, ClientAuthPolicy, ClientTls, Listener, ServerTls, ServerVerification,
    };
    use lodge_identity::{CredentialPaths, IssueRequest, issue};
    use lodge_protocol::wire::ACK_SENTINEL;
    use lodge_protocol::{Manifest, ResolveQuery, SentState, Tool};
    use lodge_receiver::{LogSink, ReceiverConfig, ReceiverError, ReceiverServer, SubmissionService};
    use lodge_submit::{
        ClientSettings, CopyError, CopyFuture, Policy, ScpCopier, SecureCopy, Submission,
        TlsDialer,
    };
    use lodge_transfer::{ContentStore, DigestAlgorithm, Hasher, Links};
    use tempfile::TempDir;
    use tokio::task::JoinHandle;

    const TARGET: &str = "lodge@localhost:~lodge/incoming/";
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Stands in for scp by copying straight into the receiving directory.
    struct StoreCopier {
        root: PathBuf,
        copies: AtomicUsize,
    }

    impl StoreCopier {
        fn new(root: &Path) -> Self {
            Self {
                root: root.to_path_buf(),
                copies: AtomicUsize::new(0),
            }
        }

        fn copies(&self) -> usize {
            self.copies.load(Ordering::SeqCst)
        }
    }

    impl SecureCopy for StoreCopier {
        fn copy<'a>(&'a self, source: &'a Path, destination: &'a str) -> CopyFuture<'a> {
            Box::pin(async move {
                self.copies.fetch_add(1, Ordering::SeqCst);
                let name = destination.rsplit('/').next().unwrap_or(destination);
                fs::copy(source, self.root.join(name))
                    .map(|_| ())
                    .map_err(|source| CopyError::Launch {
                        program: "cp".into(),
                        source,
                    })
            })
        }

        fn manual_command(&self, source: &Path, destination: &str) -> String {
            format!("cp {} {destination}", source.display())
        }
    }

    /// A running receiver with one client identity and a scratch workspace.
    struct Harness {
        dir: TempDir,
        store_dir: PathBuf,
        log_path: PathBuf,
        addr: String,
        client_tls: ClientTls,
        server: Arc<ReceiverServer>,
        task: JoinHandle<Result<(), ReceiverError>>,
    }

    impl Harness {
        async fn start() -> Self {
            let dir = TempDir::new().unwrap();
            let server_tls =
                ServerTls::load(&credentials(&dir, "server"), &ClientAuthPolicy::RequireAny)
                    .unwrap();
            let client_tls =
                ClientTls::load(&credentials(&dir, "alice"), &ServerVerification::Insecure)
                    .unwrap();

            let store_dir = dir.path().join("incoming");
            fs::create_dir(&store_dir).unwrap();
            let log_path = dir.path().join("manifests.log");

            let service = SubmissionService::new(
                TARGET,
                ContentStore::new(&store_dir, DigestAlgorithm::Sha256),
                LogSink::append_to(&log_path).unwrap(),
            );
            let server = ReceiverServer::new(
                ReceiverConfig {
                    dialog_timeout: TIMEOUT,
                },
                service,
            );
            let listener = Listener::bind("127.0.0.1:0", &server_tls).await.unwrap();
            let addr = listener.local_addr().unwrap().to_string();
            let task = {
                let server = Arc::clone(&server);
                tokio::spawn(async move { server.run(listener).await })
            };

            Self {
                dir,
                store_dir,
                log_path,
                addr,
                client_tls,
                server,
                task,
            }
        }

        fn dialer(&self) -> TlsDialer {
            TlsDialer::new(&self.addr, self.client_tls.clone()).with_timeout(TIMEOUT)
        }

        /// Writes a result file into the client's working area.
        fn result_file(&self, name: &str, contents: &[u8]) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, contents).unwrap();
            path
        }

        fn manifest(&self, tokens: &[String]) -> Manifest {
            let mut manifest = Manifest::new(
                "alignment run",
                "mapping",
                Tool {
                    name: "bwa".into(),
                    version: "0.7.17".into(),
                },
            );
            let links = Links::build(tokens, &mut Hasher::new(DigestAlgorithm::Sha256)).unwrap();
            links.apply(&mut manifest);
            manifest
        }

        fn logged(&self) -> Vec<Manifest> {
            fs::read_to_string(&self.log_path)
                .unwrap_or_default()
                .lines()
                .map(|line| Manifest::from_line(line.as_bytes()).unwrap())
                .collect()
        }

        async fn stop(self) {
            self.server.shutdown();
            self.task.await.unwrap().unwrap();
        }
    }

    fn credentials(dir: &TempDir, name: &str) -> CredentialPaths {
        let out = dir.path().join("credentials").join(name);
        issue(&IssueRequest::new(name, &out)).unwrap();
        CredentialPaths::in_dir(out)
    }

    fn output_token(path: &Path, kind: &str) -> String {
        format!("{},{kind}", path.display())
    }

    #[test]
    fn fixture_manifest_wire_shape() {
        let fixture = load_fixture("manifest.json");
        let parsed: Manifest = serde_json::from_value(fixture.clone()).unwrap();
        assert_eq!(parsed.output[0].sent, SentState::Unknown);
        assert_eq!(parsed.runtime_secs, Some(5400));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), fixture);
    }

    #[test]
    fn fixture_resolve_query_wire_shape() {
        let fixture = load_fixture("resolve_query.json");
        let parsed: ResolveQuery = serde_json::from_value(fixture.clone()).unwrap();
        assert_eq!(parsed.resolve.len(), 2);
        assert_eq!(serde_json::to_value(&parsed).unwrap(), fixture);
    }

    #[tokio::test]
    async fn new_output_is_copied_and_verified() {
        let harness = Harness::start().await;
        let report = harness.result_file("report.csv", b"sample,reads\nA,100\n");
        let manifest = harness.manifest(&[output_token(&report, "csv")]);
        let hash = manifest.output[0].hash.clone();

        let dialer = harness.dialer();
        let copier = StoreCopier::new(&harness.store_dir);
        let outcome = Submission::new(manifest, &ClientSettings::default(), &dialer, &copier)
            .run()
            .await
            .unwrap();

        assert_eq!(copier.copies(), 1);
        assert!(outcome.instructions.is_empty());
        assert_eq!(outcome.manifest.output[0].sent, SentState::Sent);
        assert!(harness.store_dir.join(&hash).exists());
        assert_eq!(
            outcome.acknowledgement,
            vec![
                "\"report.csv\" verified correctly.".to_string(),
                ACK_SENTINEL.to_string(),
            ]
        );

        let logged = harness.logged();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].username.as_deref(), Some("alice"));
        assert!(logged[0].serial.is_some());
        assert!(!logged[0].unverified);
        assert_eq!(logged[0].output[0].sent, SentState::Unknown);
        assert_eq!(logged[0].output[0].hash, hash);

        harness.stop().await;
    }

    #[tokio::test]
    async fn resubmission_skips_identical_content() {
        let harness = Harness::start().await;
        let report = harness.result_file("report.csv", b"sample,reads\nA,100\n");
        let tokens = [output_token(&report, "csv")];
        let dialer = harness.dialer();
        let copier = StoreCopier::new(&harness.store_dir);
        let settings = ClientSettings::default();

        Submission::new(harness.manifest(&tokens), &settings, &dialer, &copier)
            .run()
            .await
            .unwrap();
        let second = Submission::new(harness.manifest(&tokens), &settings, &dialer, &copier)
            .run()
            .await
            .unwrap();

        assert_eq!(copier.copies(), 1);
        assert_eq!(second.copies_attempted, 0);
        assert_eq!(second.manifest.output[0].sent, SentState::Pending);
        assert_eq!(second.acknowledgement, vec![ACK_SENTINEL.to_string()]);
        assert_eq!(harness.logged().len(), 2);

        harness.stop().await;
    }

    #[tokio::test]
    async fn verify_always_checks_skipped_outputs() {
        let harness = Harness::start().await;
        let report = harness.result_file("report.csv", b"sample,reads\nA,100\n");
        let tokens = [output_token(&report, "csv")];
        let dialer = harness.dialer();
        let copier = StoreCopier::new(&harness.store_dir);

        Submission::new(
            harness.manifest(&tokens),
            &ClientSettings::default(),
            &dialer,
            &copier,
        )
        .run()
        .await
        .unwrap();

        let settings = ClientSettings {
            verify: Policy::Always,
            ..ClientSettings::default()
        };
        let outcome = Submission::new(harness.manifest(&tokens), &settings, &dialer, &copier)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.copies_attempted, 0);
        assert_eq!(outcome.acknowledgement[0], "\"report.csv\" verified correctly.");

        harness.stop().await;
    }

    #[tokio::test]
    async fn colliding_content_is_not_overwritten_by_default() {
        let harness = Harness::start().await;
        let report = harness.result_file("report.csv", b"sample,reads\nA,100\n");
        let manifest = harness.manifest(&[output_token(&report, "csv")]);
        let stored = harness.store_dir.join(&manifest.output[0].hash);
        fs::write(&stored, b"something else entirely").unwrap();

        let dialer = harness.dialer();
        let copier = StoreCopier::new(&harness.store_dir);
        let outcome = Submission::new(manifest, &ClientSettings::default(), &dialer, &copier)
            .run()
            .await
            .unwrap();

        assert_eq!(copier.copies(), 0);
        assert_eq!(outcome.manifest.output[0].sent, SentState::Pending);
        assert_eq!(fs::read(&stored).unwrap(), b"something else entirely");
        assert_eq!(harness.logged().len(), 1);

        harness.stop().await;
    }

    #[tokio::test]
    async fn failed_copy_yields_instruction_and_still_notifies() {
        let harness = Harness::start().await;
        let report = harness.result_file("report.csv", b"sample,reads\nA,100\n");
        let manifest = harness.manifest(&[output_token(&report, "csv")]);
        let hash = manifest.output[0].hash.clone();

        let dialer = harness.dialer();
        let copier = ScpCopier::with_program(harness.dir.path().join("no-such-scp"));
        let outcome = Submission::new(manifest, &ClientSettings::default(), &dialer, &copier)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.copies_attempted, 1);
        assert_eq!(outcome.instructions.len(), 1);
        assert!(outcome.instructions[0].starts_with("scp "));
        assert!(outcome.instructions[0].ends_with(&format!("{TARGET}{hash}")));
        assert_eq!(outcome.manifest.output[0].sent, SentState::Pending);
        assert_eq!(outcome.acknowledgement, vec![ACK_SENTINEL.to_string()]);
        assert!(outcome.manual_followup().is_some());
        assert_eq!(harness.logged().len(), 1);

        harness.stop().await;
    }

    #[tokio::test]
    async fn claimed_but_missing_output_is_reported_and_logged() {
        let harness = Harness::start().await;
        let report = harness.result_file("report.csv", b"never uploaded\n");
        let mut manifest = harness.manifest(&[output_token(&report, "csv")]);
        manifest.output[0].sent = SentState::Sent;
        manifest.username = Some("mallory".into());
        let hash = manifest.output[0].hash.clone();

        let channel = Channel::connect(&harness.addr, TIMEOUT, &harness.client_tls)
            .await
            .unwrap();
        let exchange = channel
            .send_receive_until(&manifest.to_line().unwrap(), ACK_SENTINEL)
            .await
            .unwrap();

        assert_eq!(
            exchange.received_lines(),
            vec![
                format!("\"report.csv\" is not on the server at \".../{hash}\"."),
                ACK_SENTINEL.to_string(),
            ]
        );
        let logged = harness.logged();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].username.as_deref(), Some("alice"));

        harness.stop().await;
    }
}
