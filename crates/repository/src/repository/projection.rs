//! Best-effort projection of records into domain models

use shared::{ProjectionMode, Record, RepositoryError, Result};
use tracing::{debug, warn};

use crate::mapper::EntityMapper;

/// Convert fetched records, dropping the ones the mapper rejects.
///
/// Empty input and foreign record types resolve per `mode`: lenient
/// returns an empty result, strict returns `NoData` / `TypeMismatch`.
pub fn project<M: EntityMapper>(
    mapper: &M,
    records: &[Record],
    mode: ProjectionMode,
) -> Result<Vec<M::Model>> {
    let entity = mapper.entity_name();

    if records.is_empty() {
        return match mode {
            ProjectionMode::Lenient => {
                debug!(entity, "no data in repository");
                Ok(Vec::new())
            }
            ProjectionMode::Strict => Err(RepositoryError::NoData),
        };
    }

    if let Some(foreign) = records.iter().find(|r| r.entity() != entity) {
        let err = RepositoryError::TypeMismatch {
            expected: entity.to_string(),
            found: foreign.entity().to_string(),
        };
        return match mode {
            ProjectionMode::Lenient => {
                warn!(error = %err, "discarding fetch result");
                Ok(Vec::new())
            }
            ProjectionMode::Strict => Err(err),
        };
    }

    let models: Vec<M::Model> = records.iter().filter_map(|r| mapper.convert(r)).collect();
    if models.len() < records.len() {
        debug!(
            entity,
            dropped = records.len() - models.len(),
            "dropped records that failed conversion"
        );
    }
    Ok(models)
}
