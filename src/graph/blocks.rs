//! Basic-block graphs of single methods

use crate::codec::{ExceptionHandler, FlowKind, Instruction};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Range;

/// A maximal straight-line run of instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasicBlock {
    pub index: usize,
    /// Offset of the first instruction
    pub start: u32,
    /// Offset just past the last instruction
    pub end: u32,
    /// Instruction indices within the method
    pub instructions: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockEdgeKind {
    FallThrough,
    Jump,
    Branch,
    SwitchCase,
    Subroutine,
    Exception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockEdge {
    pub from: usize,
    pub to: usize,
    pub kind: BlockEdgeKind,
}

/// Control-flow graph of one method body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BlockGraph {
    blocks: Vec<BasicBlock>,
    edges: Vec<BlockEdge>,
    #[serde(skip)]
    by_start: BTreeMap<u32, usize>,
}

impl BlockGraph {
    /// Split decoded instructions into blocks and connect them.
    pub fn build(instructions: &[Instruction], handlers: &[ExceptionHandler]) -> Self {
        let Some(last) = instructions.last() else {
            return Self::default();
        };
        let code_end = last.next_offset();

        let mut leaders = BTreeSet::from([0u32]);
        for insn in instructions {
            match insn.flow() {
                FlowKind::Next => {}
                FlowKind::Goto(target) => {
                    leaders.insert(target);
                }
                FlowKind::Branch(target) | FlowKind::Subroutine(target) => {
                    leaders.insert(target);
                }
                FlowKind::Switch { default, targets } => {
                    leaders.insert(default);
                    leaders.extend(targets);
                }
                FlowKind::Exit => {}
            }
            if insn.ends_block() {
                leaders.insert(insn.next_offset());
            }
        }
        for handler in handlers {
            leaders.extend([handler.start, handler.end, handler.handler]);
        }
        leaders.retain(|offset| *offset < code_end);

        let mut graph = Self::default();
        let mut first = 0;
        for (i, insn) in instructions.iter().enumerate() {
            let is_last = instructions
                .get(i + 1)
                .is_none_or(|next| leaders.contains(&next.offset));
            if is_last {
                let index = graph.blocks.len();
                graph.by_start.insert(instructions[first].offset, index);
                graph.blocks.push(BasicBlock {
                    index,
                    start: instructions[first].offset,
                    end: insn.next_offset(),
                    instructions: first..i + 1,
                });
                first = i + 1;
            }
        }

        let mut seen = HashSet::new();
        let mut add = |graph: &mut Self, from: usize, to_offset: u32, kind: BlockEdgeKind| {
            if let Some(&to) = graph.by_start.get(&to_offset) {
                let edge = BlockEdge { from, to, kind };
                if seen.insert(edge) {
                    graph.edges.push(edge);
                }
            }
        };

        for index in 0..graph.blocks.len() {
            let block = &graph.blocks[index];
            let tail = &instructions[block.instructions.end - 1];
            let next = block.end;
            match tail.flow() {
                FlowKind::Next => add(&mut graph, index, next, BlockEdgeKind::FallThrough),
                FlowKind::Goto(target) => add(&mut graph, index, target, BlockEdgeKind::Jump),
                FlowKind::Branch(target) => {
                    add(&mut graph, index, target, BlockEdgeKind::Branch);
                    add(&mut graph, index, next, BlockEdgeKind::FallThrough);
                }
                FlowKind::Subroutine(target) => {
                    add(&mut graph, index, target, BlockEdgeKind::Subroutine);
                    add(&mut graph, index, next, BlockEdgeKind::FallThrough);
                }
                FlowKind::Switch { default, targets } => {
                    add(&mut graph, index, default, BlockEdgeKind::SwitchCase);
                    for target in targets {
                        add(&mut graph, index, target, BlockEdgeKind::SwitchCase);
                    }
                }
                FlowKind::Exit => {}
            }
        }

        for handler in handlers {
            for index in 0..graph.blocks.len() {
                if handler.covers(graph.blocks[index].start) {
                    add(&mut graph, index, handler.handler, BlockEdgeKind::Exception);
                }
            }
        }

        graph
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn edges(&self) -> &[BlockEdge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn successors(&self, block: usize) -> Vec<usize> {
        self.edges.iter().filter(|e| e.from == block).map(|e| e.to).collect()
    }

    pub fn predecessors(&self, block: usize) -> Vec<usize> {
        self.edges.iter().filter(|e| e.to == block).map(|e| e.from).collect()
    }

    /// The block containing a code offset
    pub fn block_at(&self, offset: u32) -> Option<&BasicBlock> {
        let (_, &index) = self.by_start.range(..=offset).next_back()?;
        let block = &self.blocks[index];
        (offset < block.end).then_some(block)
    }
}
