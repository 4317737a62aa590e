//! Integration tests for makebuildserver

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::io::Write;

    fn makebuildserver() -> Command {
        cargo_bin_cmd!("makebuildserver")
    }

    #[test]
    fn help_displays() {
        makebuildserver()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Reproducible Android build-server VM provisioning",
            ));
    }

    #[test]
    fn version_displays() {
        makebuildserver()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("makebuildserver"));
    }

    #[test]
    fn wrong_directory_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        makebuildserver()
            .current_dir(tmp.path())
            .arg("--skip-cache-update")
            .assert()
            .failure()
            .stderr(predicate::str::contains("buildserver/ directory"));
    }

    #[test]
    fn unparseable_config_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("makebuildserver.toml");
        std::fs::write(&config_path, "vm = \"not a table\"").unwrap();

        makebuildserver()
            .current_dir(tmp.path())
            .args(["--config", config_path.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn unsupported_provider_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("makebuildserver.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "[vm]\nprovider = \"hyperv\"").unwrap();

        makebuildserver()
            .current_dir(tmp.path())
            .args(["--config", config_path.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unsupported provider"));
    }

    #[test]
    fn version_pin_on_custom_basebox_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("makebuildserver.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "[basebox]\nname = \"me/box\"\nversion = \"1.0\"").unwrap();

        makebuildserver()
            .current_dir(tmp.path())
            .args(["--config", config_path.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("pinned"));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        makebuildserver().args(["-q", "-v"]).assert().failure();
    }
}
