//! Unit of work: one (model run, lead time, variable) combination.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::run::ModelRun;
use crate::variable::Variable;

/// Forecast hours ahead of the run's reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadTime(u16);

impl LeadTime {
    pub fn new(hours: u16) -> Self {
        Self(hours)
    }

    pub fn hours(&self) -> u16 {
        self.0
    }

    /// Elapsed seconds between the reference time and the valid time.
    pub fn seconds(&self) -> u32 {
        self.0 as u32 * 3600
    }
}

/// Zero-padded to three digits, the way it appears in file names.
impl fmt::Display for LeadTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl FromStr for LeadTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .map(LeadTime)
            .map_err(|_| ParseError::InvalidLeadTime(s.to_string()))
    }
}

/// The atomic unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId {
    pub run: ModelRun,
    pub lead: LeadTime,
    pub variable: Variable,
}

impl UnitId {
    pub fn new(run: ModelRun, lead: LeadTime, variable: Variable) -> Self {
        Self {
            run,
            lead,
            variable,
        }
    }

    /// Every unit of a run: the full cross-product of lead times and variables,
    /// ordered by lead time first.
    pub fn cross_product(run: ModelRun, leads: &[LeadTime], variables: &[Variable]) -> Vec<Self> {
        leads
            .iter()
            .flat_map(|&lead| variables.iter().map(move |&var| Self::new(run, lead, var)))
            .collect()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.run, self.lead, self.variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_time_padding() {
        assert_eq!(LeadTime::new(6).to_string(), "006");
        assert_eq!(LeadTime::new(120).to_string(), "120");
        assert_eq!(LeadTime::new(6).seconds(), 21_600);
    }

    #[test]
    fn test_lead_time_parse() {
        assert_eq!("012".parse::<LeadTime>().unwrap(), LeadTime::new(12));
        assert!("-1".parse::<LeadTime>().is_err());
    }

    #[test]
    fn test_cross_product_is_complete() {
        let run: ModelRun = "2018112000".parse().unwrap();
        let leads = [LeadTime::new(6), LeadTime::new(12), LeadTime::new(18)];
        let vars = [Variable::T2m, Variable::TotPrec];

        let units = UnitId::cross_product(run, &leads, &vars);
        assert_eq!(units.len(), 6);
        for lead in leads {
            for var in vars {
                assert!(units.contains(&UnitId::new(run, lead, var)));
            }
        }
    }

    #[test]
    fn test_unit_display() {
        let run: ModelRun = "2018112000".parse().unwrap();
        let unit = UnitId::new(run, LeadTime::new(6), Variable::T2m);
        assert_eq!(unit.to_string(), "2018112000_006_T_2M");
    }
}
