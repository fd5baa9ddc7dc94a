//! Target schema and the source-to-target column mapping.
//!
//! The `student_data` layout is fixed in code ([`STUDENT_FIELDS`]). How a
//! given export's headers reach those fields is data: a YAML
//! [`MappingTable`], embedded by default and overridable per run.
//!
//! ## Responsibilities
//!
//! - Field catalog with one [`FieldKind`] per canonical field
//! - YAML mapping loading, saving and validation via `serde_yaml`
//! - Best-effort header renaming ([`ColumnPlan::resolve`])
//! - Key column probing over an ordered candidate list ([`probe_id_column`])

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{coerce::Coercer, data::Cell, error::IngestError};

pub const ID_FIELD: &str = "id";
pub const DEFAULT_SHEET: &str = "202430";
const BUILTIN_MAPPING: &str = include_str!("../config/student_mapping.yaml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Date,
    Boolean,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Date => "date",
            FieldKind::Boolean => "boolean",
        }
    }

    /// SQLite storage class; dates are ISO-8601 text, booleans 0/1.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::String | FieldKind::Date => "TEXT",
            FieldKind::Integer | FieldKind::Boolean => "INTEGER",
            FieldKind::Float => "REAL",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Every non-key column of `student_data`, in table order.
pub const STUDENT_FIELDS: &[FieldSpec] = &[
    // Program
    field("codigo_antiguo", FieldKind::String),
    field("periodo_catalogo", FieldKind::String),
    field("programa", FieldKind::String),
    field("snies", FieldKind::String),
    field("pensum", FieldKind::String),
    // Personal
    field("expedida_en", FieldKind::String),
    field("fecha_exp_doc", FieldKind::Date),
    field("sexo", FieldKind::String),
    field("estado_civil", FieldKind::String),
    field("fecha_nacimiento", FieldKind::Date),
    field("ciudad1", FieldKind::String),
    field("direccion1", FieldKind::String),
    field("telefono1", FieldKind::String),
    field("ciudad2", FieldKind::String),
    field("direccion", FieldKind::String),
    // Secondary school
    field("nivel", FieldKind::String),
    field("cod_col", FieldKind::String),
    field("colegio", FieldKind::String),
    field("dir_colegio", FieldKind::String),
    field("ciudad_colegio", FieldKind::String),
    field("depto_colegio", FieldKind::String),
    field("municipio_colegio", FieldKind::String),
    field("pais_colegio", FieldKind::String),
    field("fecha_graduacion", FieldKind::Date),
    // Standardized test scores
    field("ptj_fisica", FieldKind::Float),
    field("ptj_quimica", FieldKind::Float),
    field("ptj_geografia", FieldKind::Float),
    field("ptj_ciencias_sociales", FieldKind::Float),
    field("ptj_sociales_ciudadano", FieldKind::Float),
    field("ptj_ciencias_naturales", FieldKind::Float),
    field("ptj_biologia", FieldKind::Float),
    field("ptj_filosofia", FieldKind::Float),
    field("ptj_lenguaje", FieldKind::Float),
    field("ptj_lectura_critica", FieldKind::Float),
    field("ptj_ingles", FieldKind::Float),
    field("ptj_historia", FieldKind::Float),
    field("ptj_matematicas", FieldKind::Float),
    field("icfes_antes_del_2000", FieldKind::Boolean),
    field("ecaes", FieldKind::Float),
    // Status
    field("cod_estado", FieldKind::String),
    field("estado", FieldKind::String),
    field("cod_tipo", FieldKind::String),
    field("tipo_estudiante", FieldKind::String),
    // Academic performance
    field("pga_acumulado", FieldKind::Float),
    field("pga_acumulado_periodo_busqueda", FieldKind::Float),
    field("creditos_matriculados", FieldKind::Integer),
    field("creditos_intentadas", FieldKind::Integer),
    field("creditos_ganadas", FieldKind::Integer),
    field("creditos_pasadas", FieldKind::Integer),
    field("creditos_pga", FieldKind::Integer),
    field("puntos_calidad_pga", FieldKind::Float),
    field("promedio_periodo", FieldKind::Float),
    field("creditos_intentadas_periodo", FieldKind::Integer),
    field("creditos_ganadas_periodo", FieldKind::Integer),
    field("creditos_pasadas_periodo", FieldKind::Integer),
    field("creditos_pga_periodo", FieldKind::Integer),
    field("puntos_calidad_pga_periodo", FieldKind::Float),
    field("nro_materias_cursadas", FieldKind::Integer),
    field("nro_materias_reprobadas", FieldKind::Integer),
    field("nro_materias_aprobadas", FieldKind::Integer),
    field("nro_materias_matriculadas", FieldKind::Integer),
    field("nro_materias_finalizadas", FieldKind::Integer),
    // Additional
    field("situacion", FieldKind::String),
    field("estrato", FieldKind::Integer),
    field("becas", FieldKind::String),
    field("ceres", FieldKind::String),
    field("periodo_ingreso", FieldKind::String),
    field("peri_in_prog_vigente", FieldKind::String),
];

pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    STUDENT_FIELDS.iter().find(|spec| spec.name == name)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMapping {
    pub source: String,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default = "MappingTable::default_sheet")]
    pub default_sheet: String,
    #[serde(default)]
    pub sheet_fallbacks: Vec<String>,
    pub id_candidates: Vec<String>,
    #[serde(default = "MappingTable::default_id_sample_size")]
    pub id_sample_size: usize,
    #[serde(default = "MappingTable::default_sentinels")]
    pub sentinels: Vec<String>,
    pub columns: Vec<ColumnMapping>,
}

impl MappingTable {
    fn default_sheet() -> String {
        DEFAULT_SHEET.to_string()
    }

    const fn default_id_sample_size() -> usize {
        3
    }

    fn default_sentinels() -> Vec<String> {
        crate::coerce::DEFAULT_SENTINELS
            .iter()
            .map(|token| token.to_string())
            .collect()
    }

    /// The mapping shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_MAPPING).context("Parsing built-in student mapping")
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let table: MappingTable = serde_yaml::from_str(raw).context("Parsing mapping YAML")?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening mapping file {path:?}"))?;
        let table: MappingTable =
            serde_yaml::from_reader(BufReader::new(file)).context("Parsing mapping YAML")?;
        table
            .validate()
            .with_context(|| format!("Validating mapping file {path:?}"))?;
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let file = File::create(path).with_context(|| format!("Creating mapping file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing mapping YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing mapping to YAML string")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.id_candidates.is_empty(),
            "Mapping must list at least one id candidate column"
        );
        ensure!(self.id_sample_size > 0, "id_sample_size must be positive");
        ensure!(
            !self.default_sheet.trim().is_empty(),
            "default_sheet cannot be empty"
        );
        let mut seen = HashSet::new();
        for (idx, mapping) in self.columns.iter().enumerate() {
            ensure!(
                !mapping.source.trim().is_empty(),
                "Mapping entry {} has an empty source header",
                idx + 1
            );
            ensure!(
                mapping.field != ID_FIELD,
                "Mapping entry {} targets '{ID_FIELD}'; the key column is chosen from id_candidates",
                idx + 1
            );
            ensure!(
                field_spec(&mapping.field).is_some(),
                "Mapping entry {} targets unknown field '{}'",
                idx + 1,
                mapping.field
            );
            ensure!(
                seen.insert(mapping.source.as_str()),
                "Source header '{}' is mapped more than once",
                mapping.source
            );
        }
        Ok(())
    }

    pub fn field_for(&self, source: &str) -> Option<&'static FieldSpec> {
        self.columns
            .iter()
            .find(|mapping| mapping.source == source)
            .and_then(|mapping| field_spec(&mapping.field))
    }

    /// Sheet names to try, in order: the requested one, then the fallbacks.
    pub fn sheet_candidates(&self, requested: Option<&str>) -> Vec<String> {
        std::iter::once(requested.unwrap_or(&self.default_sheet))
            .chain(self.sheet_fallbacks.iter().map(String::as_str))
            .map(str::to_string)
            .unique()
            .collect()
    }

    pub fn coercer(&self) -> Coercer {
        Coercer::with_sentinels(&self.sentinels)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub index: usize,
    pub source: String,
    pub field: &'static str,
    pub kind: FieldKind,
}

/// Headers of one sheet resolved against a [`MappingTable`].
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub id_index: usize,
    pub id_column: String,
    pub bindings: Vec<FieldBinding>,
    pub unmapped: Vec<String>,
}

impl ColumnPlan {
    pub fn resolve(
        table: &MappingTable,
        headers: &[String],
        rows: &[Vec<Cell>],
    ) -> Result<Self, IngestError> {
        let coercer = table.coercer();
        let (id_index, id_column) = probe_id_column(
            headers,
            rows,
            &table.id_candidates,
            table.id_sample_size,
            &coercer,
        )
        .ok_or_else(|| IngestError::NoIdColumn {
            candidates: table.id_candidates.clone(),
            headers: headers.to_vec(),
        })?;
        info!("Using '{id_column}' as the student id column");

        let mut bindings: Vec<FieldBinding> = Vec::new();
        let mut bound: BTreeMap<&'static str, &str> = BTreeMap::new();
        let mut unmapped = Vec::new();
        for (index, header) in headers.iter().enumerate() {
            let Some(spec) = table.field_for(header) else {
                if index != id_index && !header.is_empty() {
                    unmapped.push(header.clone());
                }
                continue;
            };
            if let Some(previous) = bound.get(spec.name) {
                warn!(
                    "Column '{header}' also maps to '{}'; keeping '{previous}'",
                    spec.name
                );
                continue;
            }
            bound.insert(spec.name, header);
            bindings.push(FieldBinding {
                index,
                source: header.clone(),
                field: spec.name,
                kind: spec.kind,
            });
        }
        debug!(
            "Mapped {} column(s); auxiliary: [{}]",
            bindings.len(),
            unmapped.iter().join(", ")
        );
        Ok(ColumnPlan {
            id_index,
            id_column,
            bindings,
            unmapped,
        })
    }

    pub fn binding(&self, field: &str) -> Option<&FieldBinding> {
        self.bindings.iter().find(|binding| binding.field == field)
    }
}

/// Pick the first candidate header whose sampled cells hold at least one
/// usable identifier. Returns the column index and header name.
pub fn probe_id_column(
    headers: &[String],
    rows: &[Vec<Cell>],
    candidates: &[String],
    sample_size: usize,
    coercer: &Coercer,
) -> Option<(usize, String)> {
    for candidate in candidates {
        let Some(index) = headers.iter().position(|header| header == candidate) else {
            continue;
        };
        let samples = rows
            .iter()
            .filter_map(|row| row.get(index))
            .filter(|cell| !cell.is_missing())
            .take(sample_size)
            .collect::<Vec<_>>();
        let valid = samples
            .iter()
            .filter(|cell| coercer.coerce_string(cell).is_some())
            .count();
        debug!(
            "Probing id candidate '{candidate}': {valid}/{} sampled value(s) usable",
            samples.len()
        );
        if valid > 0 {
            return Some((index, candidate.clone()));
        }
    }
    None
}
