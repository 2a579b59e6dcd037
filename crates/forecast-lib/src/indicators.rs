//! Catalog of the demographic indicator tables
//!
//! Every table is keyed by the year column `id_tahun`. The age table is
//! additionally partitioned by `kategori_usia`.

use serde::Serialize;

/// Period column shared by every indicator table
pub const PERIOD_KEY: &str = "id_tahun";

/// Where an indicator lives and which columns are forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Indicator {
    /// Name used on the command line
    pub name: &'static str,
    pub table: &'static str,
    pub description: &'static str,
    pub period_key: &'static str,
    /// Partition column for per-cohort models
    pub cohort_key: Option<&'static str>,
    pub targets: &'static [&'static str],
    /// Apply monotonic repair to forecasts
    pub monotonic: bool,
}

impl Indicator {
    /// Every column the fetch must return
    pub fn feature_keys(&self) -> Vec<&'static str> {
        let mut keys = vec![self.period_key];
        keys.extend(self.cohort_key);
        keys
    }
}

static CATALOG: &[Indicator] = &[
    Indicator {
        name: "population",
        table: "penduduk_tahunan",
        description: "Total population by year, with male and female counts",
        period_key: PERIOD_KEY,
        cohort_key: None,
        targets: &["jumlah_penduduk", "laki_laki", "perempuan"],
        monotonic: true,
    },
    Indicator {
        name: "households",
        table: "keluarga",
        description: "Heads of household by year, split by sex",
        period_key: PERIOD_KEY,
        cohort_key: None,
        targets: &["jumlah_kepala_keluarga", "pria", "wanita"],
        monotonic: true,
    },
    Indicator {
        name: "migration",
        table: "migrasi",
        description: "Inbound and outbound migration by year",
        period_key: PERIOD_KEY,
        cohort_key: None,
        targets: &["migrasi_masuk", "migrasi_keluar"],
        monotonic: true,
    },
    Indicator {
        name: "marital-status",
        table: "status_perkawinan",
        description: "Married and divorced residents by year",
        period_key: PERIOD_KEY,
        cohort_key: None,
        targets: &["status_kawin", "cerai_hidup"],
        monotonic: true,
    },
    Indicator {
        name: "age-cohorts",
        table: "penduduk_usia",
        description: "Residents per age bracket (0-14, 15-60, 60+) by year",
        period_key: PERIOD_KEY,
        cohort_key: Some("kategori_usia"),
        targets: &["laki_laki", "perempuan", "total"],
        monotonic: true,
    },
    Indicator {
        name: "school-dropouts",
        table: "putus_sekolah",
        description: "School dropouts by year",
        period_key: PERIOD_KEY,
        cohort_key: None,
        targets: &["jumlah_putus_sekolah"],
        monotonic: true,
    },
];

pub fn all() -> &'static [Indicator] {
    CATALOG
}

/// Look up an indicator by name or table name
pub fn find(name: &str) -> Option<&'static Indicator> {
    let name = name.trim();
    CATALOG
        .iter()
        .find(|i| i.name.eq_ignore_ascii_case(name) || i.table == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_name_or_table() {
        assert_eq!(find("population").unwrap().table, "penduduk_tahunan");
        assert_eq!(find("migrasi").unwrap().name, "migration");
        assert_eq!(find("Age-Cohorts").unwrap().cohort_key, Some("kategori_usia"));
        assert!(find("income").is_none());
    }

    #[test]
    fn test_feature_keys_include_cohort() {
        assert_eq!(find("age-cohorts").unwrap().feature_keys(), vec!["id_tahun", "kategori_usia"]);
        assert_eq!(find("households").unwrap().feature_keys(), vec!["id_tahun"]);
    }

    #[test]
    fn test_catalog_names_are_unique() {
        let mut names: Vec<&str> = all().iter().map(|i| i.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all().len());
        assert!(all().iter().all(|i| !i.targets.is_empty()));
    }
}
