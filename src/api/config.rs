use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::{CollectionKind, FIELD_START_AT, TimeWindowTuning};
use crate::error::{DashError, DashResult};
use crate::reconcile::{RowPairing, default_editable_columns};

/// Table columns whose active cell opens a detail popup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellDetailConfig {
    /// Charging table columns that open the charging-speed curve.
    pub battery_curve_columns: Vec<String>,
    /// Trip table columns that open the altitude profile.
    pub altitude_columns: Vec<String>,
}

impl Default for CellDetailConfig {
    fn default() -> Self {
        Self {
            battery_curve_columns: vec!["start_level".to_owned(), "end_level".to_owned()],
            altitude_columns: vec!["altitude_diff".to_owned()],
        }
    }
}

/// Dashboard-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub time_window: TimeWindowTuning,
    /// Column identifying a table row; also the store's update key.
    pub key_column: String,
    pub row_pairing: RowPairing,
    pub editable_columns: IndexMap<CollectionKind, Vec<String>>,
    /// Price written into chargings that have none.
    pub default_charging_price: Option<f64>,
    /// Derive `altitude_diff` on trips from `end_altitude - start_altitude`.
    pub derive_altitude_diff: bool,
    pub cell_detail: CellDetailConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            time_window: TimeWindowTuning::default(),
            key_column: FIELD_START_AT.to_owned(),
            row_pairing: RowPairing::default(),
            editable_columns: default_editable_columns(),
            default_charging_price: None,
            derive_altitude_diff: true,
            cell_detail: CellDetailConfig::default(),
        }
    }
}

impl DashboardConfig {
    #[must_use]
    pub fn with_mark_target_count(mut self, count: usize) -> Self {
        self.time_window.mark_target_count = count;
        self
    }

    #[must_use]
    pub fn with_row_pairing(mut self, pairing: RowPairing) -> Self {
        self.row_pairing = pairing;
        self
    }

    #[must_use]
    pub fn with_editable_columns(mut self, kind: CollectionKind, columns: &[&str]) -> Self {
        self.editable_columns
            .insert(kind, columns.iter().map(|c| (*c).to_owned()).collect());
        self
    }

    #[must_use]
    pub fn with_default_charging_price(mut self, price: f64) -> Self {
        self.default_charging_price = Some(price);
        self
    }

    #[must_use]
    pub fn with_altitude_diff(mut self, enabled: bool) -> Self {
        self.derive_altitude_diff = enabled;
        self
    }

    pub fn validate(&self) -> DashResult<()> {
        self.time_window.validate()?;
        if self.key_column.trim().is_empty() {
            return Err(DashError::InvalidConfig(
                "key column must not be empty".to_owned(),
            ));
        }
        if let Some(price) = self.default_charging_price {
            if !price.is_finite() || price < 0.0 {
                return Err(DashError::InvalidConfig(
                    "default charging price must be finite and >= 0".to_owned(),
                ));
            }
        }
        if let Some((kind, _)) = self
            .editable_columns
            .iter()
            .find(|(_, columns)| columns.iter().any(|c| *c == self.key_column))
        {
            return Err(DashError::InvalidConfig(format!(
                "key column {} cannot be editable on {kind}",
                self.key_column
            )));
        }
        Ok(())
    }

    pub fn from_json_str(input: &str) -> DashResult<Self> {
        let config: Self = serde_json::from_str(input)
            .map_err(|e| DashError::InvalidConfig(format!("failed to parse config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> DashResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DashError::InvalidConfig(format!("failed to serialize config json: {e}")))
    }
}
