//! Centralized configuration for metafix.
//!
//! Compile-time defaults live on unit structs as associated constants.
//! Runtime settings (server address, credentials, batch sizing) are plain
//! structs built by the caller, usually from command line arguments.

use crate::error::{MetafixError, Result};
use crate::model::{Field, FieldSelection};
use std::time::Duration;
use url::Url;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = "metafix/0.3";
    pub const PATCH_CONTENT_TYPE: &'static str = "application/json-patch+json";
    pub const SCAN_RETRY_ATTEMPTS: u32 = 3;
    pub const SCAN_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
}

/// Batch scheduling configuration.
pub struct BatchConfig;

impl BatchConfig {
    /// Upper bound on concurrently running items per chunk.
    pub const BATCH_SIZE: usize = 20;
}

/// Scan query configuration.
pub struct ScanConfig;

impl ScanConfig {
    /// Reserved response key carrying transport metadata.
    pub const SYSTEM_KEY: &'static str = "system";
    pub const FIELDS_PARAM: &'static str = "id,name,shortName,code,description";
    /// Fields the over-fetching scan filters on.
    pub const SCAN_FIELDS: [Field; 3] = [Field::Name, Field::Code, Field::Description];
}

/// Supported metadata collection types.
///
/// Each variant maps to the plural resource name the store uses both as the
/// API path segment and as the key in query responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionType {
    AnalyticsTableHooks,
    Attributes,
    Categories,
    CategoryCombos,
    CategoryOptionCombos,
    CategoryOptionGroups,
    CategoryOptionGroupSets,
    CategoryOptions,
    Constants,
    Dashboards,
    DataApprovalLevels,
    DataApprovalWorkflows,
    DataElementGroups,
    DataElementGroupSets,
    DataElements,
    DataEntryForms,
    DataSets,
    Documents,
    EventFilters,
    EventReports,
    EventVisualizations,
    ExternalMapLayers,
    IndicatorGroups,
    Indicators,
    IndicatorTypes,
    LegendSets,
    Maps,
    OptionGroups,
    OptionGroupSets,
    Options,
    OptionSets,
    OrganisationUnitGroups,
    OrganisationUnitGroupSets,
    OrganisationUnitLevels,
    OrganisationUnits,
    PredictorGroups,
    Predictors,
    ProgramIndicators,
    ProgramNotificationTemplates,
    ProgramRules,
    ProgramRuleVariables,
    Programs,
    ProgramSections,
    ProgramStages,
    ProgramStageSections,
    ProgramTrackedEntityAttributeGroups,
    RelationshipTypes,
    Reports,
    Sections,
    SqlViews,
    TrackedEntityAttributes,
    TrackedEntityInstanceFilters,
    TrackedEntityTypes,
    UserGroups,
    UserRoles,
    ValidationNotificationTemplates,
    ValidationRuleGroups,
    ValidationRules,
    Visualizations,
}

/// Which fields must stay unique among records repaired together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniquenessPolicy {
    /// Fields compared pairwise between records of the same batch.
    pub batch_fields: FieldSelection,
}

impl CollectionType {
    pub const ALL: [CollectionType; 59] = [
        CollectionType::AnalyticsTableHooks,
        CollectionType::Attributes,
        CollectionType::Categories,
        CollectionType::CategoryCombos,
        CollectionType::CategoryOptionCombos,
        CollectionType::CategoryOptionGroups,
        CollectionType::CategoryOptionGroupSets,
        CollectionType::CategoryOptions,
        CollectionType::Constants,
        CollectionType::Dashboards,
        CollectionType::DataApprovalLevels,
        CollectionType::DataApprovalWorkflows,
        CollectionType::DataElementGroups,
        CollectionType::DataElementGroupSets,
        CollectionType::DataElements,
        CollectionType::DataEntryForms,
        CollectionType::DataSets,
        CollectionType::Documents,
        CollectionType::EventFilters,
        CollectionType::EventReports,
        CollectionType::EventVisualizations,
        CollectionType::ExternalMapLayers,
        CollectionType::IndicatorGroups,
        CollectionType::Indicators,
        CollectionType::IndicatorTypes,
        CollectionType::LegendSets,
        CollectionType::Maps,
        CollectionType::OptionGroups,
        CollectionType::OptionGroupSets,
        CollectionType::Options,
        CollectionType::OptionSets,
        CollectionType::OrganisationUnitGroups,
        CollectionType::OrganisationUnitGroupSets,
        CollectionType::OrganisationUnitLevels,
        CollectionType::OrganisationUnits,
        CollectionType::PredictorGroups,
        CollectionType::Predictors,
        CollectionType::ProgramIndicators,
        CollectionType::ProgramNotificationTemplates,
        CollectionType::ProgramRules,
        CollectionType::ProgramRuleVariables,
        CollectionType::Programs,
        CollectionType::ProgramSections,
        CollectionType::ProgramStages,
        CollectionType::ProgramStageSections,
        CollectionType::ProgramTrackedEntityAttributeGroups,
        CollectionType::RelationshipTypes,
        CollectionType::Reports,
        CollectionType::Sections,
        CollectionType::SqlViews,
        CollectionType::TrackedEntityAttributes,
        CollectionType::TrackedEntityInstanceFilters,
        CollectionType::TrackedEntityTypes,
        CollectionType::UserGroups,
        CollectionType::UserRoles,
        CollectionType::ValidationNotificationTemplates,
        CollectionType::ValidationRuleGroups,
        CollectionType::ValidationRules,
        CollectionType::Visualizations,
    ];

    /// Resource name used in API paths and response keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::AnalyticsTableHooks => "analyticsTableHooks",
            CollectionType::Attributes => "attributes",
            CollectionType::Categories => "categories",
            CollectionType::CategoryCombos => "categoryCombos",
            CollectionType::CategoryOptionCombos => "categoryOptionCombos",
            CollectionType::CategoryOptionGroups => "categoryOptionGroups",
            CollectionType::CategoryOptionGroupSets => "categoryOptionGroupSets",
            CollectionType::CategoryOptions => "categoryOptions",
            CollectionType::Constants => "constants",
            CollectionType::Dashboards => "dashboards",
            CollectionType::DataApprovalLevels => "dataApprovalLevels",
            CollectionType::DataApprovalWorkflows => "dataApprovalWorkflows",
            CollectionType::DataElementGroups => "dataElementGroups",
            CollectionType::DataElementGroupSets => "dataElementGroupSets",
            CollectionType::DataElements => "dataElements",
            CollectionType::DataEntryForms => "dataEntryForms",
            CollectionType::DataSets => "dataSets",
            CollectionType::Documents => "documents",
            CollectionType::EventFilters => "eventFilters",
            CollectionType::EventReports => "eventReports",
            CollectionType::EventVisualizations => "eventVisualizations",
            CollectionType::ExternalMapLayers => "externalMapLayers",
            CollectionType::IndicatorGroups => "indicatorGroups",
            CollectionType::Indicators => "indicators",
            CollectionType::IndicatorTypes => "indicatorTypes",
            CollectionType::LegendSets => "legendSets",
            CollectionType::Maps => "maps",
            CollectionType::OptionGroups => "optionGroups",
            CollectionType::OptionGroupSets => "optionGroupSets",
            CollectionType::Options => "options",
            CollectionType::OptionSets => "optionSets",
            CollectionType::OrganisationUnitGroups => "organisationUnitGroups",
            CollectionType::OrganisationUnitGroupSets => "organisationUnitGroupSets",
            CollectionType::OrganisationUnitLevels => "organisationUnitLevels",
            CollectionType::OrganisationUnits => "organisationUnits",
            CollectionType::PredictorGroups => "predictorGroups",
            CollectionType::Predictors => "predictors",
            CollectionType::ProgramIndicators => "programIndicators",
            CollectionType::ProgramNotificationTemplates => "programNotificationTemplates",
            CollectionType::ProgramRules => "programRules",
            CollectionType::ProgramRuleVariables => "programRuleVariables",
            CollectionType::Programs => "programs",
            CollectionType::ProgramSections => "programSections",
            CollectionType::ProgramStages => "programStages",
            CollectionType::ProgramStageSections => "programStageSections",
            CollectionType::ProgramTrackedEntityAttributeGroups => "programTrackedEntityAttributeGroups",
            CollectionType::RelationshipTypes => "relationshipTypes",
            CollectionType::Reports => "reports",
            CollectionType::Sections => "sections",
            CollectionType::SqlViews => "sqlViews",
            CollectionType::TrackedEntityAttributes => "trackedEntityAttributes",
            CollectionType::TrackedEntityInstanceFilters => "trackedEntityInstanceFilters",
            CollectionType::TrackedEntityTypes => "trackedEntityTypes",
            CollectionType::UserGroups => "userGroups",
            CollectionType::UserRoles => "userRoles",
            CollectionType::ValidationNotificationTemplates => "validationNotificationTemplates",
            CollectionType::ValidationRuleGroups => "validationRuleGroups",
            CollectionType::ValidationRules => "validationRules",
            CollectionType::Visualizations => "visualizations",
        }
    }

    /// Look up a collection type by its exact (case-sensitive) resource name.
    pub fn from_api_name(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == s)
    }

    /// Human-readable title, e.g. `DataElements` for `dataElements`.
    pub fn title(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Uniqueness rules applied when several records are repaired together.
    ///
    /// Organisation units do not enforce name uniqueness the way other
    /// types do, so only their code blocks a batch repair.
    pub fn policy(&self) -> UniquenessPolicy {
        match self {
            CollectionType::OrganisationUnits => UniquenessPolicy {
                batch_fields: FieldSelection::only(Field::Code),
            },
            _ => UniquenessPolicy {
                batch_fields: FieldSelection::all(),
            },
        }
    }
}

impl std::fmt::Display for CollectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How requests authenticate against the store.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    Basic { username: String, password: String },
    /// Personal access token, sent as `Authorization: ApiToken <token>`.
    Token(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::Basic { username, .. } => {
                write!(f, "Basic {{ username: {:?}, password: <redacted> }}", username)
            }
            Credentials::Token(_) => write!(f, "Token(<redacted>)"),
        }
    }
}

/// Connection settings for a DHIS2 instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_url: Url,
    pub credentials: Credentials,
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Build a server config, validating the base URL.
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(MetafixError::Config {
                message: "Base URL must not be empty".to_string(),
            });
        }

        let base_url = Url::parse(trimmed)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(MetafixError::Config {
                message: format!("Unsupported URL scheme: {}", base_url.scheme()),
            });
        }

        Ok(Self {
            base_url,
            credentials,
            request_timeout: NetworkConfig::REQUEST_TIMEOUT,
        })
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Base URL as a string without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}

/// Tunables for the detection and repair engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum items in flight per chunk.
    pub batch_size: usize,
    /// Optional ceiling on a single item's detection or repair.
    pub item_timeout: Option<Duration>,
    /// Attempts per scan request (including the first).
    pub scan_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: BatchConfig::BATCH_SIZE,
            item_timeout: None,
            scan_attempts: NetworkConfig::SCAN_RETRY_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn with_scan_attempts(mut self, attempts: u32) -> Self {
        self.scan_attempts = attempts.max(1);
        self
    }
}
