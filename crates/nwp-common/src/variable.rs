//! Forecast variables published by the source and products derived from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// How a field's values relate to time, which decides its raster post-processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Valid at the forecast time; written as-is.
    Instantaneous,
    /// Published as a rate; scaled by the elapsed forecast seconds into an
    /// accumulated depth.
    Accumulated,
}

/// A single-level field published per (run, lead time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variable {
    /// Temperature at 2 m
    #[serde(rename = "T_2M")]
    T2m,
    /// Dew point at 2 m
    #[serde(rename = "TD_2M")]
    Td2m,
    /// Total precipitation
    #[serde(rename = "TOT_PREC")]
    TotPrec,
    /// Zonal wind at 10 m
    #[serde(rename = "U_10M")]
    U10m,
    /// Meridional wind at 10 m
    #[serde(rename = "V_10M")]
    V10m,
    /// Mean sea level pressure
    #[serde(rename = "PMSL")]
    Pmsl,
    /// Total cloud cover
    #[serde(rename = "CLCT")]
    Clct,
    /// Relative humidity at 2 m
    #[serde(rename = "RELHUM_2M")]
    RelHum2m,
}

impl Variable {
    pub const ALL: [Variable; 8] = [
        Variable::T2m,
        Variable::Td2m,
        Variable::TotPrec,
        Variable::U10m,
        Variable::V10m,
        Variable::Pmsl,
        Variable::Clct,
        Variable::RelHum2m,
    ];

    /// Upper-case short name as it appears in published file names.
    pub fn code(&self) -> &'static str {
        match self {
            Variable::T2m => "T_2M",
            Variable::Td2m => "TD_2M",
            Variable::TotPrec => "TOT_PREC",
            Variable::U10m => "U_10M",
            Variable::V10m => "V_10M",
            Variable::Pmsl => "PMSL",
            Variable::Clct => "CLCT",
            Variable::RelHum2m => "RELHUM_2M",
        }
    }

    /// Lower-case directory name on the remote server.
    pub fn dir_name(&self) -> String {
        self.code().to_lowercase()
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Variable::TotPrec => FieldKind::Accumulated,
            _ => FieldKind::Instantaneous,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Variable {
    type Err = ParseError;

    /// Accepts exactly the published code, the same names the config uses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variable::ALL
            .iter()
            .copied()
            .find(|v| v.code() == s)
            .ok_or_else(|| ParseError::UnknownVariable(s.to_string()))
    }
}

/// A raster computed from several variables of the same (run, lead time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivedProduct {
    /// Wind speed at 10 m, the magnitude of (U_10M, V_10M)
    #[serde(rename = "WIND_10M")]
    WindSpeed10m,
}

impl DerivedProduct {
    pub fn code(&self) -> &'static str {
        match self {
            DerivedProduct::WindSpeed10m => "WIND_10M",
        }
    }

    /// The two orthogonal vector components this product is computed from.
    pub fn components(&self) -> [Variable; 2] {
        match self {
            DerivedProduct::WindSpeed10m => [Variable::U10m, Variable::V10m],
        }
    }

    pub fn consumes(&self, variable: Variable) -> bool {
        self.components().contains(&variable)
    }
}

impl fmt::Display for DerivedProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DerivedProduct {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WIND_10M" => Ok(DerivedProduct::WindSpeed10m),
            _ => Err(ParseError::UnknownProduct(s.to_string())),
        }
    }
}
