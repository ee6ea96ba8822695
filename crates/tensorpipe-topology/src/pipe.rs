use dashmap::DashMap;
use tensorpipe_core::{ModelId, NodeId, PipeId};

use crate::error::{Result, TopologyError};
use crate::segment::Segment;

/// A read-only snapshot of which node owns which layer range for one (model, pipe)
/// pairing. Mutation only ever happens through `PipeRegistry::insert`/`remove`, mirroring
/// how the original weight-load/unload events are the only writers of this view.
#[derive(Debug, Clone)]
pub struct Pipe {
    pub id: PipeId,
    pub model_id: ModelId,
    pub num_hidden_layers: u32,
    pub end_node_id: NodeId,
    segments: Vec<Segment>,
}

impl Pipe {
    pub fn new(
        id: PipeId,
        model_id: ModelId,
        num_hidden_layers: u32,
        end_node_id: NodeId,
        mut segments: Vec<Segment>,
    ) -> Self {
        segments.sort_by_key(|s| s.start_layer());
        Self {
            id,
            model_id,
            num_hidden_layers,
            end_node_id,
            segments,
        }
    }

    /// True iff the segments, sorted by `start_layer`, partition `[0, num_hidden_layers)`
    /// with no gap or overlap and every segment loaded.
    pub fn is_complete(&self) -> bool {
        if self.num_hidden_layers == 0 {
            return false;
        }
        let mut expected_start = 0u32;
        for segment in &self.segments {
            if segment.start_layer() != expected_start || !segment.is_loaded() {
                return false;
            }
            expected_start = segment.end_layer() + 1;
        }
        expected_start == self.num_hidden_layers
    }

    /// The segment whose range starts at `layer_index`. When `need_physical` is set, a
    /// virtual segment there does not count as found.
    pub fn get_layer(&self, layer_index: u32, need_physical: bool) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| s.start_layer() == layer_index && (!need_physical || !s.is_virtual()))
    }

    /// The segment covering `layer_index`, regardless of where its range starts.
    pub fn segment_covering(&self, layer_index: u32) -> Option<&Segment> {
        self.segments.iter().find(|s| s.covers(layer_index))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// Process-wide registry of pipes this node knows about, keyed by pipe id and indexed by
/// model for the job factory's "find a pipe for this model" lookup.
#[derive(Debug, Default)]
pub struct PipeRegistry {
    pipes: DashMap<PipeId, Pipe>,
}

impl PipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pipe: Pipe) {
        self.pipes.insert(pipe.id.clone(), pipe);
    }

    pub fn remove(&self, pipe_id: &PipeId) {
        self.pipes.remove(pipe_id);
    }

    pub fn get(&self, pipe_id: &PipeId) -> Option<Pipe> {
        self.pipes.get(pipe_id).map(|p| p.clone())
    }

    /// The first complete pipe serving `model_id`. Errors distinguish "no pipe at all"
    /// from "a pipe exists but is missing coverage", per the job factory's `NO_PIPE` vs.
    /// `PIPE_INCOMPLETE` distinction.
    pub fn find_for_model(&self, model_id: &ModelId) -> Result<Pipe> {
        let mut saw_any = false;
        for entry in self.pipes.iter() {
            if entry.model_id == *model_id {
                saw_any = true;
                if entry.is_complete() {
                    return Ok(entry.clone());
                }
            }
        }
        if saw_any {
            Err(TopologyError::PipeIncomplete(PipeId::new(
                model_id.as_str(),
            )))
        } else {
            Err(TopologyError::NoPipe(model_id.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeId {
        NodeId::generate()
    }

    #[test]
    fn complete_pipe_partitions_all_layers() {
        let a = node();
        let b = node();
        let pipe = Pipe::new(
            PipeId::new("p1"),
            ModelId::new("m"),
            8,
            a,
            vec![
                Segment::Local {
                    node_id: a,
                    start_layer: 0,
                    end_layer: 3,
                    loaded: true,
                },
                Segment::Virtual {
                    node_id: b,
                    start_layer: 4,
                    end_layer: 7,
                },
            ],
        );
        assert!(pipe.is_complete());
    }

    #[test]
    fn gap_in_coverage_is_incomplete() {
        let a = node();
        let pipe = Pipe::new(
            PipeId::new("p1"),
            ModelId::new("m"),
            8,
            a,
            vec![Segment::Local {
                node_id: a,
                start_layer: 0,
                end_layer: 3,
                loaded: true,
            }],
        );
        assert!(!pipe.is_complete());
    }

    #[test]
    fn unloaded_local_segment_is_incomplete() {
        let a = node();
        let pipe = Pipe::new(
            PipeId::new("p1"),
            ModelId::new("m"),
            4,
            a,
            vec![Segment::Local {
                node_id: a,
                start_layer: 0,
                end_layer: 3,
                loaded: false,
            }],
        );
        assert!(!pipe.is_complete());
    }

    #[test]
    fn single_node_owning_all_layers_is_complete() {
        let a = node();
        let pipe = Pipe::new(
            PipeId::new("p1"),
            ModelId::new("m"),
            4,
            a,
            vec![Segment::Local {
                node_id: a,
                start_layer: 0,
                end_layer: 3,
                loaded: true,
            }],
        );
        assert!(pipe.is_complete());
    }

    #[test]
    fn registry_distinguishes_no_pipe_from_incomplete() {
        let registry = PipeRegistry::new();
        let missing = ModelId::new("missing");
        assert!(matches!(
            registry.find_for_model(&missing),
            Err(TopologyError::NoPipe(_))
        ));

        let a = node();
        registry.insert(Pipe::new(
            PipeId::new("p1"),
            ModelId::new("partial"),
            8,
            a,
            vec![Segment::Local {
                node_id: a,
                start_layer: 0,
                end_layer: 3,
                loaded: true,
            }],
        ));
        assert!(matches!(
            registry.find_for_model(&ModelId::new("partial")),
            Err(TopologyError::PipeIncomplete(_))
        ));
    }
}
