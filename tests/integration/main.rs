//! Integration tests for Grist

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn grist() -> Command {
        cargo_bin_cmd!("grist")
    }

    /// A command isolated from the user's config and state
    fn isolated(temp: &TempDir, config: &str) -> Command {
        let config_path = temp.path().join("config.toml");
        std::fs::write(&config_path, config).unwrap();

        let mut cmd = grist();
        cmd.env("GRIST_CONFIG", &config_path)
            .env("GRIST_HOME", temp.path().join("state"));
        cmd
    }

    /// A file:// Maven repository holding a placeholder antlr4 complete jar
    fn offline_repository(root: &Path) -> String {
        let base = root.join("org/antlr/antlr4");
        std::fs::create_dir_all(base.join("4.13.1")).unwrap();
        std::fs::write(
            base.join("maven-metadata.xml"),
            "<metadata><versioning><versions><version>4.13.1</version></versions></versioning></metadata>",
        )
        .unwrap();
        std::fs::write(base.join("4.13.1/antlr4-4.13.1-complete.jar"), b"jar").unwrap();

        url::Url::from_directory_path(root).unwrap().to_string()
    }

    fn file_url(path: &Path) -> String {
        url::Url::from_file_path(path).unwrap().to_string()
    }

    #[test]
    fn help_displays() {
        grist()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("incremental parser builder"))
            .stdout(predicate::str::contains("GRAMMAR_URL"));
    }

    #[test]
    fn version_displays() {
        grist()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("grist"));
    }

    #[test]
    fn missing_grammar_url_fails() {
        grist()
            .arg("Java")
            .assert()
            .failure()
            .stderr(predicate::str::contains("GRAMMAR_URL"));
    }

    #[test]
    fn invalid_url_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        isolated(&temp, "")
            .args(["Java", "not a url"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid grammar URL"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_config_fails() {
        let temp = TempDir::new().unwrap();
        isolated(&temp, "[store]\nstrict = 3\n")
            .args(["Java", "https://example.com/Java.g4"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn unresolvable_generator_fails() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty-repo");
        std::fs::create_dir_all(&empty).unwrap();
        let config = format!(
            "[maven]\nrepository = \"{}\"\n",
            url::Url::from_directory_path(&empty).unwrap()
        );

        isolated(&temp, &config)
            .args(["Java", "https://example.com/Java.g4"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Dependency resolution failed"));

        assert!(temp.path().join("state").join("store").is_dir());
    }

    #[test]
    fn missing_grammar_fails() {
        let temp = TempDir::new().unwrap();
        let repo = offline_repository(&temp.path().join("repo"));
        let config = format!("[maven]\nrepository = \"{}\"\n", repo);

        isolated(&temp, &config)
            .args(["Java", &file_url(&temp.path().join("missing").join("Java.g4"))])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Fetch failed"));
    }

    #[cfg(unix)]
    mod offline_build {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(path: &Path, body: &str) -> String {
            std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.display().to_string()
        }

        /// Config with fake `java`/`javac` that log each call to `calls`
        fn fake_jdk_config(temp: &TempDir, calls: &Path) -> String {
            let repo = offline_repository(&temp.path().join("repo"));
            // java -cp <cp> <main> -o <dir> -package <pkg> <grammar>
            let java = script(
                &temp.path().join("fake-java"),
                &format!(
                    "echo java >> '{}'\nmkdir -p \"$5\"\necho 'class JavaParser {{}}' > \"$5/JavaParser.java\"",
                    calls.display()
                ),
            );
            // javac -cp <cp> -sourcepath <roots> -d <out> <sources>
            let javac = script(
                &temp.path().join("fake-javac"),
                &format!(
                    "echo javac >> '{}'\nmkdir -p \"$6/parser\"\necho cafebabe > \"$6/parser/JavaParser.class\"",
                    calls.display()
                ),
            );

            format!(
                "[maven]\nrepository = \"{}\"\n\n[java]\njava = \"{}\"\njavac = \"{}\"\n\n[packaging]\nformat = \"tar\"\n",
                repo, java, javac
            )
        }

        fn grammar(temp: &TempDir) -> PathBuf {
            let path = temp.path().join("grammars").join("Java.g4");
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "grammar Java;").unwrap();
            path
        }

        #[test]
        fn builds_and_reuses_parser_archive() {
            let temp = TempDir::new().unwrap();
            let calls = temp.path().join("calls.log");
            let config = fake_jdk_config(&temp, &calls);
            let url = file_url(&grammar(&temp));

            for _ in 0..2 {
                let output = isolated(&temp, &config)
                    .args(["Java", &url])
                    .assert()
                    .success()
                    .get_output()
                    .stdout
                    .clone();

                let printed = String::from_utf8(output).unwrap();
                let archive = PathBuf::from(printed.trim_end());
                assert_eq!(printed.lines().count(), 1);
                assert!(archive.ends_with("parse-Java.tar"));
                assert!(archive.is_file());
            }

            let log = std::fs::read_to_string(&calls).unwrap();
            assert_eq!(log.lines().collect::<Vec<_>>(), vec!["java", "javac"]);
        }

        #[test]
        fn explicit_archive_path() {
            let temp = TempDir::new().unwrap();
            let calls = temp.path().join("calls.log");
            let config = fake_jdk_config(&temp, &calls);
            let url = file_url(&grammar(&temp));
            let archive = temp.path().join("dist").join("java.tar");

            isolated(&temp, &config)
                .args(["Java", &url, "--target-jar"])
                .arg(&archive)
                .assert()
                .success()
                .stdout(predicate::str::diff(format!("{}\n", archive.display())));

            assert!(archive.is_file());
        }

        #[test]
        fn invalid_package_is_rejected() {
            let temp = TempDir::new().unwrap();
            let calls = temp.path().join("calls.log");
            let config = fake_jdk_config(&temp, &calls);

            isolated(&temp, &config)
                .args(["Java", &file_url(&grammar(&temp)), "--package", "a./etc"])
                .assert()
                .failure()
                .stderr(predicate::str::contains("invalid parser package"));

            assert!(!calls.exists());
        }

        #[test]
        fn failing_generator_reports_generation_failure() {
            let temp = TempDir::new().unwrap();
            let repo = offline_repository(&temp.path().join("repo"));
            let java = script(&temp.path().join("fake-java"), "echo 'error(50): syntax error' >&2\nexit 1");
            let config = format!(
                "[maven]\nrepository = \"{}\"\n\n[java]\njava = \"{}\"\n",
                repo, java
            );

            isolated(&temp, &config)
                .args(["Java", &file_url(&grammar(&temp))])
                .assert()
                .failure()
                .stderr(predicate::str::contains("Source generation failed"))
                .stderr(predicate::str::contains("syntax error"));
        }
    }
}
