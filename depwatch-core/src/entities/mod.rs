pub mod deposit_event;
pub mod watcher_cursor;

use depwatch_sdk::objects::AssetKind;

/// Asset kind for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `depwatch_sdk::objects::AssetKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "asset_kind")]
pub enum AssetKindName {
    Native,
    Token,
}

impl From<AssetKindName> for AssetKind {
    fn from(value: AssetKindName) -> Self {
        match value {
            AssetKindName::Native => AssetKind::Native,
            AssetKindName::Token => AssetKind::Token,
        }
    }
}

impl From<AssetKind> for AssetKindName {
    fn from(value: AssetKind) -> Self {
        match value {
            AssetKind::Native => AssetKindName::Native,
            AssetKind::Token => AssetKindName::Token,
        }
    }
}
