//! Parser for the tool's generated SSH connection info
//!
//! `vagrant ssh-config` emits an OpenSSH-style text blob. Its format is an
//! informal protocol, so the fields the cache synchronizer needs are
//! extracted behind an explicit parser that fails with a named missing
//! field instead of an unrelated pattern error.

use crate::error::{BuildServerError, BuildServerResult};
use std::path::PathBuf;

/// SSH connection parameters for the running guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub identity_file: PathBuf,
}

impl ConnectionProfile {
    /// Parse `User`, `HostName`, `Port` and `IdentityFile` out of an
    /// ssh-config text blob
    pub fn parse(text: &str) -> BuildServerResult<Self> {
        let user = field(text, "User").ok_or(BuildServerError::SshConfigField("User"))?;
        let host = field(text, "HostName").ok_or(BuildServerError::SshConfigField("HostName"))?;
        let port = field(text, "Port")
            .and_then(|p| p.parse().ok())
            .ok_or(BuildServerError::SshConfigField("Port"))?;
        let identity_file = field(text, "IdentityFile")
            .ok_or(BuildServerError::SshConfigField("IdentityFile"))?;

        Ok(Self {
            user,
            host,
            port,
            identity_file: PathBuf::from(identity_file),
        })
    }
}

/// First occurrence of `<key> <value>`, with surrounding quotes stripped
fn field(text: &str, key: &str) -> Option<String> {
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        if parts.next() == Some(key) {
            let value = parts.next()?;
            return Some(value.trim_matches('"').to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SSH_CONFIG: &str = "\
Host default
  HostName 127.0.0.1
  User vagrant
  Port 2222
  UserKnownHostsFile /dev/null
  StrictHostKeyChecking no
  IdentityFile \"/home/op/buildserver/.vagrant/machines/default/virtualbox/private_key\"
  IdentitiesOnly yes
  LogLevel FATAL
";

    #[test]
    fn parses_all_fields() {
        let profile = ConnectionProfile::parse(SSH_CONFIG).unwrap();
        assert_eq!(profile.user, "vagrant");
        assert_eq!(profile.host, "127.0.0.1");
        assert_eq!(profile.port, 2222);
        assert_eq!(
            profile.identity_file,
            PathBuf::from("/home/op/buildserver/.vagrant/machines/default/virtualbox/private_key")
        );
    }

    #[test]
    fn missing_field_is_named() {
        let text = "Host default\n  HostName 127.0.0.1\n  Port 2222\n";
        let err = ConnectionProfile::parse(text).unwrap_err();
        assert!(matches!(err, BuildServerError::SshConfigField("User")));
    }

    #[test]
    fn unparseable_port_is_a_port_error() {
        let text = "User vagrant\nHostName h\nPort lots\nIdentityFile /k\n";
        let err = ConnectionProfile::parse(text).unwrap_err();
        assert!(matches!(err, BuildServerError::SshConfigField("Port")));
    }
}
