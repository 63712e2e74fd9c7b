//! Vault configuration.

use passvault_core::join;
use passvault_crypto::KdfParams;

/// Configuration for the Vault.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// scrypt cost used when sealing new private keys.
    pub kdf: KdfParams,
    /// Re-fetch the scope and its files after a permission commit.
    pub refresh_after_commit: bool,
    /// Commit message for new files.
    pub add_file_message: String,
    /// Commit message for edited files. `{path}` is replaced by the path.
    pub edit_file_message: String,
    /// Suffix appended to new file names.
    pub file_suffix: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            refresh_after_commit: true,
            add_file_message: "commit from web frontend".to_string(),
            edit_file_message: "edited password {path} from web".to_string(),
            file_suffix: passvault_core::FILE_SUFFIX.to_string(),
        }
    }
}

impl VaultConfig {
    /// Path of a new file called `name` in `dir`.
    pub fn file_path(&self, dir: &str, name: &str) -> String {
        join(dir, &format!("{}{}", name, self.file_suffix))
    }

    pub fn edit_message(&self, path: &str) -> String {
        self.edit_file_message.replace("{path}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_collapses_separators() {
        let config = VaultConfig::default();
        assert_eq!(config.file_path("/web//", "github"), "/web/github.gpg");
        assert_eq!(config.file_path("/", "bank"), "/bank.gpg");
    }

    #[test]
    fn test_edit_message() {
        let config = VaultConfig::default();
        assert_eq!(
            config.edit_message("/web/github.gpg"),
            "edited password /web/github.gpg from web"
        );
    }
}
