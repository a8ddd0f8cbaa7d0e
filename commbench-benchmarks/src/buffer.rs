//! Payload buffers for one measurement point.
use crate::op::OpKind;
use commbench::Element;

/// Shape of one buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub elements: usize,
    pub element_size: usize,
}

impl BufferDesc {
    pub fn bytes(&self) -> usize {
        self.elements * self.element_size
    }
}

/// Input and output buffers sized for one op and payload.
///
/// Ops that work in place (broadcast, all-reduce) and pt2pt only use
/// `input`; `output` stays empty for them.
pub struct Payload<T: Element> {
    pub input: Vec<T>,
    pub output: Vec<T>,
}

impl<T: Element> Payload<T> {
    /// Allocate buffers for `op` with `elements` elements per process (per
    /// destination for all-to-all). The input is filled with the rank so
    /// reductions and gathers produce recognizable values.
    pub fn for_op(op: OpKind, elements: usize, world_size: usize, rank: usize) -> Payload<T> {
        let (input_len, output_len) = match op {
            OpKind::Broadcast | OpKind::AllReduce | OpKind::Pt2pt => (elements, 0),
            OpKind::AllGather => (elements, elements * world_size),
            OpKind::AllToAll => (elements * world_size, elements * world_size),
        };
        Payload {
            input: vec![T::from_index(rank); input_len],
            output: vec![T::default(); output_len],
        }
    }

    pub fn input_desc(&self) -> BufferDesc {
        BufferDesc {
            elements: self.input.len(),
            element_size: std::mem::size_of::<T>(),
        }
    }

    pub fn output_desc(&self) -> BufferDesc {
        BufferDesc {
            elements: self.output.len(),
            element_size: std::mem::size_of::<T>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_gather_output_is_world_size_shards() {
        let payload = Payload::<f32>::for_op(OpKind::AllGather, 256, 4, 1);
        assert_eq!(payload.input_desc().elements, 256);
        assert_eq!(payload.output_desc().elements, 1024);
        assert_eq!(payload.input_desc().bytes(), 1024);
        assert!(payload.input.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn all_to_all_holds_one_shard_per_peer() {
        let payload = Payload::<i64>::for_op(OpKind::AllToAll, 8, 3, 0);
        assert_eq!(payload.input.len(), 24);
        assert_eq!(payload.output.len(), 24);
        assert_eq!(payload.output_desc().bytes(), 192);
    }

    #[test]
    fn in_place_ops_have_no_output() {
        for op in [OpKind::AllReduce, OpKind::Broadcast, OpKind::Pt2pt] {
            let payload = Payload::<u8>::for_op(op, 100, 8, 5);
            assert_eq!(payload.input.len(), 100);
            assert!(payload.output.is_empty());
        }
    }
}
