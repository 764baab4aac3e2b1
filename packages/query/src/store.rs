//! Compile-time registry of SQL templates, one store per generation.
//!
//! Each template is a `.sql` file under `templates/<generation>/`, baked
//! into the binary with [`include_str!`]. The registry lists the variables
//! each file declares; [`TemplateStore::new`] checks the two agree.

use std::collections::BTreeMap;

use imazon_alerts_models::{Generation, RegionKind};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::QueryError;
use crate::params::{
    BEGIN_VAR, END_VAR, GEOJSON_VAR, GID_VAR, ID1_VAR, ID2_VAR, ISO_VAR, LEVEL_VAR, LIMIT_VAR,
    PID_VAR, SIMPLIFY_VAR, SUMMARY_VAR, TABLE_VAR, USE_TABLE_VAR, WDPA_VAR,
};
use crate::template::QueryTemplate;

/// Logical query names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum TemplateName {
    /// Alerts inside an arbitrary polygon.
    World,
    /// Alerts inside a country.
    National,
    /// Alerts inside a first-level admin unit.
    Province,
    /// Alerts inside a second-level admin unit.
    District,
    /// Alerts inside an industrial-use concession.
    ConcessionUse,
    /// Alerts inside a protected area.
    ProtectedArea,
    /// Most recent alert date(s).
    LatestDate,
    /// Plain area of an admin unit by GADM id.
    AdminArea,
    /// Plain area of a concession.
    ConcessionArea,
    /// Plain area of a protected area.
    ProtectedAreaArea,
}

impl TemplateName {
    /// The aggregation template for a region kind.
    #[must_use]
    pub const fn for_region(kind: RegionKind) -> Self {
        match kind {
            RegionKind::World => Self::World,
            RegionKind::National => Self::National,
            RegionKind::Province => Self::Province,
            RegionKind::District => Self::District,
            RegionKind::Concession => Self::ConcessionUse,
            RegionKind::ProtectedArea => Self::ProtectedArea,
        }
    }

    /// Whether this template aggregates alerts (and so carries the summary
    /// placeholder).
    #[must_use]
    pub const fn is_aggregation(self) -> bool {
        matches!(
            self,
            Self::World
                | Self::National
                | Self::Province
                | Self::District
                | Self::ConcessionUse
                | Self::ProtectedArea
        )
    }
}

struct TemplateSource {
    name: TemplateName,
    sql: &'static str,
    variables: &'static [&'static str],
}

// ── Compile-time embedded SQL ───────────────────────────────────────

const V1_TEMPLATES: &[TemplateSource] = &[
    TemplateSource {
        name: TemplateName::World,
        sql: include_str!("../templates/v1/world.sql"),
        variables: &[GEOJSON_VAR, BEGIN_VAR, END_VAR, SUMMARY_VAR],
    },
    TemplateSource {
        name: TemplateName::National,
        sql: include_str!("../templates/v1/national.sql"),
        variables: &[ISO_VAR, BEGIN_VAR, END_VAR, SUMMARY_VAR],
    },
    TemplateSource {
        name: TemplateName::Province,
        sql: include_str!("../templates/v1/province.sql"),
        variables: &[ISO_VAR, ID1_VAR, BEGIN_VAR, END_VAR, SUMMARY_VAR],
    },
    TemplateSource {
        name: TemplateName::ConcessionUse,
        sql: include_str!("../templates/v1/concession.sql"),
        variables: &[USE_TABLE_VAR, PID_VAR, BEGIN_VAR, END_VAR, SUMMARY_VAR],
    },
    TemplateSource {
        name: TemplateName::ProtectedArea,
        sql: include_str!("../templates/v1/protected_area.sql"),
        variables: &[WDPA_VAR, BEGIN_VAR, END_VAR, SUMMARY_VAR],
    },
    TemplateSource {
        name: TemplateName::LatestDate,
        sql: include_str!("../templates/v1/latest.sql"),
        variables: &[LIMIT_VAR],
    },
];

const V2_TEMPLATES: &[TemplateSource] = &[
    TemplateSource {
        name: TemplateName::World,
        sql: include_str!("../templates/v2/world.sql"),
        variables: &[GEOJSON_VAR, BEGIN_VAR, END_VAR, SUMMARY_VAR],
    },
    TemplateSource {
        name: TemplateName::National,
        sql: include_str!("../templates/v2/national.sql"),
        variables: &[ISO_VAR, SIMPLIFY_VAR, BEGIN_VAR, END_VAR, SUMMARY_VAR],
    },
    TemplateSource {
        name: TemplateName::Province,
        sql: include_str!("../templates/v2/province.sql"),
        variables: &[ISO_VAR, ID1_VAR, SIMPLIFY_VAR, BEGIN_VAR, END_VAR, SUMMARY_VAR],
    },
    TemplateSource {
        name: TemplateName::District,
        sql: include_str!("../templates/v2/district.sql"),
        variables: &[
            ISO_VAR,
            ID1_VAR,
            ID2_VAR,
            SIMPLIFY_VAR,
            BEGIN_VAR,
            END_VAR,
            SUMMARY_VAR,
        ],
    },
    TemplateSource {
        name: TemplateName::ConcessionUse,
        sql: include_str!("../templates/v2/concession.sql"),
        variables: &[USE_TABLE_VAR, PID_VAR, BEGIN_VAR, END_VAR, SUMMARY_VAR],
    },
    TemplateSource {
        name: TemplateName::ProtectedArea,
        sql: include_str!("../templates/v2/protected_area.sql"),
        variables: &[WDPA_VAR, BEGIN_VAR, END_VAR, SUMMARY_VAR],
    },
    TemplateSource {
        name: TemplateName::LatestDate,
        sql: include_str!("../templates/v2/latest.sql"),
        variables: &[],
    },
    TemplateSource {
        name: TemplateName::AdminArea,
        sql: include_str!("../templates/v2/admin_area.sql"),
        variables: &[TABLE_VAR, LEVEL_VAR, GID_VAR],
    },
    TemplateSource {
        name: TemplateName::ConcessionArea,
        sql: include_str!("../templates/v2/concession_area.sql"),
        variables: &[USE_TABLE_VAR, PID_VAR],
    },
    TemplateSource {
        name: TemplateName::ProtectedAreaArea,
        sql: include_str!("../templates/v2/protected_area_area.sql"),
        variables: &[WDPA_VAR],
    },
];

/// Immutable mapping from template name to template for one generation.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    generation: Generation,
    templates: BTreeMap<TemplateName, QueryTemplate>,
}

impl TemplateStore {
    /// Registers every embedded template for `generation`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Template`] if any embedded template disagrees
    /// with its declared variables.
    pub fn new(generation: Generation) -> Result<Self, QueryError> {
        let sources = match generation {
            Generation::V1 => V1_TEMPLATES,
            Generation::V2 => V2_TEMPLATES,
        };

        let mut templates = BTreeMap::new();
        for source in sources {
            let template = QueryTemplate::new(source.name, source.sql, source.variables)?;
            templates.insert(source.name, template);
        }

        log::debug!(
            "Registered {} {generation} query templates",
            templates.len()
        );

        Ok(Self {
            generation,
            templates,
        })
    }

    /// Generation this store serves.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Looks up a template by name.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownTemplate`] if `name` is not registered
    /// for this generation.
    pub fn get(&self, name: TemplateName) -> Result<&QueryTemplate, QueryError> {
        self.templates
            .get(&name)
            .ok_or(QueryError::UnknownTemplate {
                name,
                generation: self.generation,
            })
    }
}
