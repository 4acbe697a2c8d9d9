//! Column layouts of the 250 m mesh census tables.
//!
//! Each census publishes its table under a different id and numbers the
//! columns differently, so the layout is looked up by census year.

use plateau_stats_models::Year;

/// Column id of the mesh code in every census table.
pub const KEY_COLUMN: &str = "KEY_CODE";

/// Table id and `(column suffix, attribute)` pairs of one census.
#[derive(Debug, Clone, Copy)]
pub struct CensusLayout {
    /// Table id prefixing every column (e.g. `T001142`).
    pub table: &'static str,
    /// Column suffixes and the attribute each one maps to.
    pub columns: &'static [(&'static str, &'static str)],
}

impl CensusLayout {
    /// The attribute stored for header `header`, if the layout maps it.
    #[must_use]
    pub fn attribute(&self, header: &str) -> Option<&'static str> {
        let suffix = header.strip_prefix(self.table)?;
        self.columns
            .iter()
            .find(|(code, _)| *code == suffix)
            .map(|(_, attr)| *attr)
    }

    /// Every attribute of the layout, in column order.
    pub fn attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(_, attr)| *attr)
    }
}

const CENSUS_2010: CensusLayout = CensusLayout {
    table: "T000649",
    columns: &[
        ("001", "population"),
        ("002", "male"),
        ("003", "female"),
        ("004", "households"),
    ],
};

const CENSUS_2015: CensusLayout = CensusLayout {
    table: "T000876",
    columns: &[
        ("001", "population"),
        ("002", "male"),
        ("003", "female"),
        ("004", "age_0_14"),
        ("005", "age_0_14_male"),
        ("006", "age_0_14_female"),
        ("007", "age_15_total"),
        ("008", "age_15_male"),
        ("009", "age_15_female"),
        ("010", "age_15_64"),
        ("011", "age_15_64_male"),
        ("012", "age_15_64_female"),
        ("013", "age_20_total"),
        ("014", "age_20_male"),
        ("015", "age_20_female"),
        ("016", "age_65_"),
        ("017", "age_65_male"),
        ("018", "age_65_female"),
        ("019", "age_75_total"),
        ("020", "age_75_male"),
        ("021", "age_75_female"),
        ("022", "foreign_population_total"),
        ("023", "foreign_population_male"),
        ("024", "foreign_population_female"),
        ("025", "households"),
        ("026", "general_households"),
        ("027", "one_person_households"),
        ("028", "two_person_households"),
        ("029", "three_person_households"),
        ("030", "four_person_households"),
        ("031", "five_person_households"),
        ("032", "six_person_households"),
        ("033", "seven_person_households"),
        ("034", "relatives_households"),
        ("035", "nuclear_family_households"),
        ("036", "non_nuclear_households"),
        ("037", "households_with_under_6"),
        ("038", "households_with_65_up"),
        ("039", "young_head_one_person"),
        ("040", "elderly_one_person"),
        ("041", "elderly_couple"),
    ],
};

const CENSUS_2020: CensusLayout = CensusLayout {
    table: "T001142",
    columns: &[
        ("001", "population"),
        ("002", "male"),
        ("003", "female"),
        ("004", "age_0_14"),
        ("005", "age_0_14_male"),
        ("006", "age_0_14_female"),
        ("007", "age_15_total"),
        ("008", "age_15_male"),
        ("009", "age_15_female"),
        ("010", "age_15_64"),
        ("011", "age_15_64_male"),
        ("012", "age_15_64_female"),
        ("019", "age_65_"),
        ("020", "age_65_male"),
        ("021", "age_65_female"),
        ("022", "age_75_total"),
        ("023", "age_75_male"),
        ("024", "age_75_female"),
        ("025", "age_85_total"),
        ("026", "age_85_male"),
        ("027", "age_85_female"),
        ("028", "age_95_total"),
        ("029", "age_95_male"),
        ("030", "age_95_female"),
        ("031", "foreign_population_total"),
        ("032", "foreign_population_male"),
        ("033", "foreign_population_female"),
        ("034", "households"),
        ("035", "general_households"),
        ("036", "one_person_households"),
        ("037", "two_person_households"),
        ("038", "three_person_households"),
        ("039", "four_person_households"),
        ("040", "five_person_households"),
        ("041", "six_person_households"),
        ("042", "seven_person_households"),
        ("043", "relatives_households"),
        ("044", "nuclear_family_households"),
        ("045", "non_nuclear_households"),
        ("046", "households_with_under_6"),
        ("047", "households_with_65_up"),
        ("048", "young_head_one_person"),
        ("049", "elderly_one_person"),
        ("050", "elderly_couple"),
    ],
};

/// The layout of the census held in `year`, if known.
#[must_use]
pub const fn layout(year: Year) -> Option<CensusLayout> {
    match year.value() {
        2010 => Some(CENSUS_2010),
        2015 => Some(CENSUS_2015),
        2020 => Some(CENSUS_2020),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_map_per_census() {
        let l2020 = layout(Year(2020)).unwrap();
        assert_eq!(l2020.attribute("T001142019"), Some("age_65_"));
        assert_eq!(l2020.attribute("T001142013"), None);
        assert_eq!(l2020.attribute("T000876019"), None);

        let l2015 = layout(Year(2015)).unwrap();
        assert_eq!(l2015.attribute("T000876019"), Some("age_75_total"));
        assert!(layout(Year(2005)).is_none());
    }
}
