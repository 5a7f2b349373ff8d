//! General gazetteer fallback: the description first, then each hint
//! field from most to least specific.

use crate::error::ResolveError;
use crate::gazetteer::StoreKind;
use crate::record::LocalityRecord;

use super::custom::feature_match;
use super::{MatchResult, Pipe, PipeContext, PipeKind};

pub struct GeoNamesPipe;

impl Pipe for GeoNamesPipe {
    fn kind(&self) -> PipeKind {
        PipeKind::GeoNames
    }

    fn attempt(&self, record: &LocalityRecord, ctx: &PipeContext) -> Result<Option<MatchResult>, ResolveError> {
        let description = record.description.trim();
        if !description.is_empty() {
            match ctx.resolver.resolve(description, &[StoreKind::GeoNames], None, record, &[]) {
                Ok(found) => return feature_match(PipeKind::GeoNames, ctx, &found, description).map(Some),
                Err(ResolveError::NoMatch(_)) => {}
                Err(e) => return Err(e),
            }
        }

        for spec in ctx.resolver.fields() {
            let Some(value) = record.hint(spec.field) else {
                continue;
            };
            let stores: Vec<StoreKind> = spec.stores().into_iter().filter(|s| *s != StoreKind::Custom).collect();
            match ctx.resolver.resolve(value, &stores, Some(&spec.codes), record, &[spec.field]) {
                Ok(found) => {
                    let label = format!("{}={}", spec.field, value);
                    return feature_match(PipeKind::GeoNames, ctx, &found, &label).map(Some);
                }
                Err(ResolveError::NoMatch(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ResolveError::NoMatch(format!("no gazetteer feature for {}", record.summary())))
    }
}
