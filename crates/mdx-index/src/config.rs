use serde::{Deserialize, Serialize};

use crate::codec::trie::{KEY_FIELD_LEN, VALUE_FIELD_LEN};
use crate::error::{IndexError, IndexResult};

/// Shape and limits of a [`BTree`](crate::BTree).
///
/// Index nodes hold between `order_kx + 1` and `2 * order_kx + 1` children,
/// data nodes between `order_kd` and `2 * order_kd` entries; the root is
/// exempt from the lower bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BTreeConfig {
    /// Branch order: minimum separator count of a non-root index node.
    pub order_kx: usize,
    /// Leaf order: minimum entry count of a non-root data node.
    pub order_kd: usize,
    /// Largest accepted key, in bytes.
    pub max_key_size: usize,
    /// Largest accepted value, in bytes.
    pub max_value_size: usize,
}

impl Default for BTreeConfig {
    fn default() -> Self {
        Self {
            order_kx: 32,
            order_kd: 32,
            max_key_size: 1024,
            max_value_size: 64 * 1024,
        }
    }
}

impl BTreeConfig {
    /// Default limits with the given branch and leaf orders.
    pub fn with_orders(order_kx: usize, order_kd: usize) -> Self {
        Self {
            order_kx,
            order_kd,
            ..Default::default()
        }
    }

    /// Largest number of children an index node may keep.
    pub fn max_children(&self) -> usize {
        2 * self.order_kx + 1
    }

    /// Largest number of entries a data node may keep.
    pub fn max_entries(&self) -> usize {
        2 * self.order_kd
    }

    /// Reject configurations the algorithms cannot honor.
    pub fn validate(&self) -> IndexResult<()> {
        if self.order_kx == 0 {
            return Err(IndexError::Config("order_kx must be at least 1".into()));
        }
        if self.order_kd == 0 {
            return Err(IndexError::Config("order_kd must be at least 1".into()));
        }
        if self.max_key_size == 0 {
            return Err(IndexError::Config("max_key_size must be positive".into()));
        }
        Ok(())
    }
}

/// Limits of a [`HashTrie`](crate::HashTrie).
///
/// Trie leaves use a fixed chunk layout, so the limits may only tighten the
/// field widths of that layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrieConfig {
    /// Largest accepted key, in bytes.
    pub max_key_size: usize,
    /// Largest accepted value, in bytes.
    pub max_value_size: usize,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            max_key_size: KEY_FIELD_LEN,
            max_value_size: VALUE_FIELD_LEN,
        }
    }
}

impl TrieConfig {
    /// Reject limits wider than the fixed leaf layout.
    pub fn validate(&self) -> IndexResult<()> {
        if self.max_key_size > KEY_FIELD_LEN {
            return Err(IndexError::Config(format!(
                "trie max_key_size {} exceeds the {KEY_FIELD_LEN}-byte key field",
                self.max_key_size
            )));
        }
        if self.max_value_size > VALUE_FIELD_LEN {
            return Err(IndexError::Config(format!(
                "trie max_value_size {} exceeds the {VALUE_FIELD_LEN}-byte value field",
                self.max_value_size
            )));
        }
        Ok(())
    }
}

/// Configuration for every index type, as read from a TOML document:
///
/// ```toml
/// [btree]
/// order_kx = 16
/// order_kd = 64
///
/// [trie]
/// max_value_size = 1024
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub btree: BTreeConfig,
    pub trie: TrieConfig,
}

impl IndexConfig {
    /// Parse and validate a TOML document. Missing fields take defaults.
    pub fn from_toml_str(s: &str) -> IndexResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| IndexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> IndexResult<()> {
        self.btree.validate()?;
        self.trie.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        IndexConfig::default().validate().unwrap();
        let btree = BTreeConfig::default();
        assert_eq!(btree.max_children(), 65);
        assert_eq!(btree.max_entries(), 64);
    }

    #[test]
    fn parse_partial_toml() {
        let config = IndexConfig::from_toml_str(
            r#"
            [btree]
            order_kx = 4
            order_kd = 8

            [trie]
            max_value_size = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.btree.order_kx, 4);
        assert_eq!(config.btree.order_kd, 8);
        assert_eq!(config.btree.max_key_size, 1024);
        assert_eq!(config.trie.max_value_size, 100);
        assert_eq!(config.trie.max_key_size, KEY_FIELD_LEN);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        assert_eq!(IndexConfig::from_toml_str("").unwrap(), IndexConfig::default());
    }

    #[test]
    fn zero_orders_are_rejected() {
        assert!(matches!(
            BTreeConfig::with_orders(0, 2).validate(),
            Err(IndexError::Config(_))
        ));
        assert!(matches!(
            IndexConfig::from_toml_str("[btree]\norder_kd = 0\n"),
            Err(IndexError::Config(_))
        ));
    }

    #[test]
    fn trie_limits_cannot_exceed_layout() {
        let config = TrieConfig {
            max_key_size: KEY_FIELD_LEN + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(matches!(
            IndexConfig::from_toml_str("[btree\norder_kx = "),
            Err(IndexError::Config(_))
        ));
    }
}
