//! Mappers built from a dataset definition.

use datalayer_core::{
    DatasetDefinition, EntityMapper, ItemMapper, LayerError, LayerResult, MappingConfig,
    TransformRegistry,
};
use std::sync::Arc;

/// The outgoing (read) and incoming (write) mappers of one dataset.
#[derive(Clone)]
pub(crate) struct Mappings {
    dataset: String,
    outgoing: Option<Arc<EntityMapper>>,
    incoming: Option<Arc<EntityMapper>>,
}

impl Mappings {
    pub(crate) fn new(
        definition: &DatasetDefinition,
        transforms: &TransformRegistry,
    ) -> LayerResult<Self> {
        let build = |config: &Option<MappingConfig>| -> LayerResult<Option<Arc<EntityMapper>>> {
            config
                .as_ref()
                .map(|c| EntityMapper::new(c, transforms).map(Arc::new))
                .transpose()
                .map_err(|e| match e {
                    LayerError::Configuration { message } => LayerError::configuration(format!(
                        "dataset {:?}: {message}",
                        definition.name
                    )),
                    other => other,
                })
        };
        Ok(Self {
            dataset: definition.name.clone(),
            outgoing: build(&definition.outgoing)?,
            incoming: build(&definition.incoming)?,
        })
    }

    pub(crate) fn readable(&self) -> bool {
        self.outgoing.is_some()
    }

    pub(crate) fn outgoing(&self) -> LayerResult<Arc<dyn ItemMapper>> {
        match &self.outgoing {
            Some(mapper) => {
                let mapper: Arc<dyn ItemMapper> = mapper.clone();
                Ok(mapper)
            }
            None => Err(LayerError::configuration(format!(
                "dataset {:?} has no outgoing mapping",
                self.dataset
            ))),
        }
    }

    pub(crate) fn incoming(&self) -> LayerResult<&EntityMapper> {
        self.incoming.as_deref().ok_or_else(|| {
            LayerError::write_rejected(format!(
                "dataset {:?} has no incoming mapping",
                self.dataset
            ))
        })
    }
}
