//! The fixed stage order and what each stage reports.

use plateau_stats_ingest::{Domain, Skip};
use plateau_stats_messages::label;
use plateau_stats_metrics::Calculator;
use plateau_stats_models::ErrorKind;
use strum_macros::{AsRefStr, EnumIter};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    InitContainer,
    Zone,
    Vacancy,
    Building,
    Population,
    Facility,
    Transportation,
    BuildingAssigner,
    Area,
    Financial,
    ResidentialInduction,
    UrbanFunctionInduction,
    DisasterPrevention,
    PublicTransport,
    LandUse,
    Fiscal,
    Archive,
}

impl Stage {
    /// Overall progress once this stage is done.
    #[must_use]
    pub const fn percent(self) -> u8 {
        match self {
            Self::InitContainer => 5,
            Self::Zone => 10,
            Self::Vacancy => 15,
            Self::Building => 20,
            Self::Population => 25,
            Self::Facility => 30,
            Self::Transportation => 35,
            Self::BuildingAssigner => 40,
            Self::Area => 45,
            Self::Financial => 50,
            Self::ResidentialInduction => 55,
            Self::UrbanFunctionInduction => 65,
            Self::DisasterPrevention => 75,
            Self::PublicTransport => 85,
            Self::LandUse => 95,
            Self::Fiscal | Self::Archive => 100,
        }
    }

    /// Whether any error in this stage fails the run.
    #[must_use]
    pub const fn is_required(self) -> bool {
        matches!(
            self,
            Self::InitContainer | Self::Zone | Self::Building | Self::Population
        )
    }

    /// The ingestion domain this stage runs, if any.
    #[must_use]
    pub const fn domain(self) -> Option<Domain> {
        match self {
            Self::Zone => Some(Domain::Zone),
            Self::Vacancy => Some(Domain::Vacancy),
            Self::Building => Some(Domain::Building),
            Self::Population => Some(Domain::Population),
            Self::Facility => Some(Domain::Facility),
            Self::Transportation => Some(Domain::Transportation),
            Self::Area => Some(Domain::Area),
            Self::Financial => Some(Domain::Financial),
            _ => None,
        }
    }

    /// The indicator family this stage computes, if any.
    #[must_use]
    pub const fn calculator(self) -> Option<Calculator> {
        match self {
            Self::ResidentialInduction => Some(Calculator::ResidentialInduction),
            Self::UrbanFunctionInduction => Some(Calculator::UrbanFunctionInduction),
            Self::DisasterPrevention => Some(Calculator::DisasterPrevention),
            Self::PublicTransport => Some(Calculator::PublicTransport),
            Self::LandUse => Some(Calculator::LandUse),
            Self::Fiscal => Some(Calculator::Fiscal),
            _ => None,
        }
    }

    /// Localized display name.
    #[must_use]
    pub fn label(self) -> String {
        if let Some(domain) = self.domain() {
            return domain.label();
        }
        if let Some(calculator) = self.calculator() {
            return calculator.label();
        }
        match self {
            Self::InitContainer => label("container initialization"),
            Self::BuildingAssigner => label("building assigner"),
            _ => label("archive"),
        }
    }
}

/// What one stage did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// The stage.
    pub stage: Stage,
    /// Layers written.
    pub layers: Vec<String>,
    /// Files written outside the container.
    pub files: Vec<String>,
    /// Items that were skipped, including a recovered stage error.
    pub skipped: Vec<Skip>,
}

impl StageReport {
    /// An empty report for `stage`.
    #[must_use]
    pub const fn new(stage: Stage) -> Self {
        Self {
            stage,
            layers: Vec::new(),
            files: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Records a skipped item.
    pub fn skip(&mut self, item: impl ToString, reason: impl ToString, kind: ErrorKind) {
        self.skipped.push(Skip {
            item: item.to_string(),
            reason: reason.to_string(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn progress_never_decreases() {
        let percents: Vec<u8> = Stage::iter().map(Stage::percent).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.first(), Some(&5));
        assert_eq!(percents.last(), Some(&100));
    }

    #[test]
    fn required_stages() {
        let required: Vec<Stage> = Stage::iter().filter(|s| s.is_required()).collect();
        assert_eq!(
            required,
            vec![Stage::InitContainer, Stage::Zone, Stage::Building, Stage::Population]
        );
    }

    #[test]
    fn every_domain_and_calculator_has_a_stage() {
        let domains = Stage::iter().filter_map(Stage::domain).count();
        let calculators = Stage::iter().filter_map(Stage::calculator).count();
        assert_eq!(domains, Domain::iter().count());
        assert_eq!(calculators, Calculator::iter().count());
    }
}
