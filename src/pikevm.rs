/*!
A [Pike's VM](https://swtch.com/~rsc/regexp/regexp2.html) that executes
compiled multi-pattern programs over byte streams, reporting every
non-overlapping leftmost-longest match of every pattern with absolute
offsets.

Execution is frame-oriented: a frame is the work done for exactly one input
byte. Within a frame every active thread first expands its epsilon closure
(jumps, forks, check states, match recording), then attempts to consume the
frame's byte; survivors are parked in the next frame's thread list. Forked
threads are appended to the active list mid-walk and processed in the same
frame, which is what gives the NFA its parallel-branch semantics in a
deterministic serial order. Check states bound the number of live threads
by the program size: at most one thread per frame survives past any given
check bit.

Matches are not reported the moment a `Match` instruction fires. Each
pattern label holds one candidate `(start, end)` span, and a candidate is
only emitted once a later match for the same label proves that no extension
of it can exist. This yields the leftmost-longest rule: among overlapping
matches for one label, the smallest start wins, and on equal starts the
largest end wins.

The VM is streaming-friendly: at the end of an input chunk in-flight
threads are retained, so a subsequent [`PikeVm::search`] call with the next
chunk continues the simulation as if the two chunks were contiguous.
*/

use bitvec::vec::BitVec;
use log::{debug, log_enabled, trace, Level};

use crate::instr::{OpCode, BYTE_SET_WORDS};
use crate::program::Program;
use crate::thread::{Thread, ThreadList, UNALLOCATED};

/// A finalized match report: a completed, non-overlapping leftmost-longest
/// match for its pattern label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchHit {
    /// Absolute offset of the first matched byte.
    pub offset: u64,
    /// Number of matched bytes.
    pub length: u64,
    /// Label of the pattern that matched.
    pub label: u32,
}

/// Executes a compiled [`Program`] over byte streams.
///
/// A `PikeVm` owns all of its mutable simulation state; the program it
/// borrows is immutable and can be shared by any number of VMs. A single
/// VM must not be used from multiple OS threads; callers that want
/// parallelism instantiate one VM per OS thread over the same program.
pub struct PikeVm<'p> {
    prog: &'p Program,
    /// Threads participating in the current frame.
    active: ThreadList,
    /// Threads that survived the current frame and will consume the next
    /// input byte.
    next: ThreadList,
    /// One candidate match span per pattern label, `(UNALLOCATED, 0)` when
    /// the slot is empty. Holds the leftmost-longest candidate that has
    /// not been proven final yet.
    matches: Vec<(u64, u64)>,
    /// One bit per check-state id. Bit 0 is the dirty flag: set iff any
    /// other bit was set during the current frame, so that the array is
    /// only cleared when something actually needs clearing.
    check_states: BitVec,
}

impl<'p> PikeVm<'p> {
    /// Creates a VM for the given program.
    ///
    /// The program is scanned once to size the runtime state: the matches
    /// table gets one slot per pattern label, and the check-state array
    /// one bit per check id plus the reserved dirty bit.
    pub fn new(prog: &'p Program) -> Self {
        let mut num_patterns = 0;
        let mut num_checked = 0;
        for (_, instr) in prog.instrs() {
            match instr.opcode() {
                Some(OpCode::Match) => {
                    num_patterns = num_patterns.max(instr.operand());
                }
                Some(OpCode::CheckHalt | OpCode::CheckBranch) => {
                    num_checked = num_checked.max(instr.operand());
                }
                _ => {}
            }
        }
        let num_patterns = num_patterns as usize + 1;
        let num_checked = num_checked as usize + 2;

        debug!(
            "vm: {} instruction words, {} patterns, {} check states",
            prog.len(),
            num_patterns,
            num_checked
        );

        Self {
            prog,
            active: ThreadList::with_capacity(prog.len()),
            next: ThreadList::with_capacity(prog.len()),
            matches: vec![(UNALLOCATED, 0); num_patterns],
            check_states: BitVec::repeat(false, num_checked),
        }
    }

    /// Number of pattern labels the program can report.
    #[inline]
    pub fn num_patterns(&self) -> usize {
        self.matches.len()
    }

    /// Number of check-state bits, the reserved dirty bit included.
    #[inline]
    pub fn num_checked_states(&self) -> usize {
        self.check_states.len()
    }

    /// Discards all in-flight threads and pending candidate matches,
    /// restoring the VM to its freshly-constructed state.
    pub fn reset(&mut self) {
        self.active.clear();
        self.next.clear();
        self.check_states.fill(false);
        self.matches.fill((UNALLOCATED, 0));
    }

    /// Runs the simulation over one input chunk whose first byte sits at
    /// absolute offset `start_offset`, invoking `hit_fn` for every
    /// finalized match.
    ///
    /// Returns `true` if threads remain in flight, meaning that more input
    /// may yield matches straddling this chunk's end; passing the next
    /// chunk (with its matching `start_offset`) continues the simulation.
    /// The callback must not re-enter the VM, which the `&mut self` borrow
    /// already guarantees.
    pub fn search(
        &mut self,
        data: &[u8],
        start_offset: u64,
        mut hit_fn: impl FnMut(SearchHit),
    ) -> bool {
        debug!(
            "search: {} bytes at offset {}, {} threads in flight",
            data.len(),
            start_offset,
            self.active.len()
        );

        let mut offset = start_offset;
        for &byte in data {
            self.execute_frame(byte, offset, &mut hit_fn);
            offset += 1;
        }

        self.flush(offset, &mut hit_fn)
    }

    /// Runs one frame: epsilon closure and byte consumption for every
    /// active thread, then a cold start if the byte is in the first-byte
    /// set, then the list swap.
    fn execute_frame<F: FnMut(SearchHit)>(
        &mut self,
        byte: u8,
        offset: u64,
        hit_fn: &mut F,
    ) {
        let mut i = 0;
        while i < self.active.len() {
            let mut t = self.active.get(i);
            self.run_thread(&mut t, byte, offset, hit_fn);
            i += 1;
        }

        // A fresh simulation starts here only if the byte can legally
        // begin a match. The newborn is appended after the existing
        // threads and handled by the same walk, together with any threads
        // its leading forks spawn.
        if self.prog.first()[byte as usize] {
            self.active.push(Thread::new(offset));
            while i < self.active.len() {
                let mut t = self.active.get(i);
                self.run_thread(&mut t, byte, offset, hit_fn);
                i += 1;
            }
        }

        if i > 0 {
            self.cleanup();
        }
    }

    /// Drives a single thread through one frame: closure, match emission,
    /// byte consumption, parking.
    fn run_thread<F: FnMut(SearchHit)>(
        &mut self,
        t: &mut Thread,
        byte: u8,
        offset: u64,
        hit_fn: &mut F,
    ) {
        let alive = self.closure(t, offset);
        if t.end == offset {
            self.do_match(t, hit_fn);
        }
        if alive && self.step(t, byte) {
            self.next.push(*t);
        }
    }

    /// Non-epsilon step: dispatches the consuming instruction under the
    /// thread's program counter against the current input byte.
    ///
    /// Returns `true` iff the thread survives, with its program counter
    /// advanced past the consumed byte. A `JumpTable` lands the counter on
    /// the selected slot; the slot's `Jump` resolves in the next frame's
    /// closure.
    fn step(&self, t: &mut Thread, byte: u8) -> bool {
        let instr = self.prog[t.pc];
        match instr.opcode() {
            Some(OpCode::Lit) => {
                if byte == instr.literal() {
                    t.pc += 1;
                    return true;
                }
                false
            }
            Some(OpCode::Either) => {
                let (one, two) = instr.range();
                if byte == one || byte == two {
                    t.pc += 1;
                    return true;
                }
                false
            }
            Some(OpCode::Range) => {
                let (first, last) = instr.range();
                if first <= byte && byte <= last {
                    t.pc += 1;
                    return true;
                }
                false
            }
            Some(OpCode::BitVector) => {
                let limb = self.prog[t.pc + 1 + (byte >> 6) as usize].raw();
                if limb >> (byte & 63) & 1 == 1 {
                    t.pc += 1 + BYTE_SET_WORDS;
                    return true;
                }
                false
            }
            Some(OpCode::JumpTable) => {
                t.pc += 1 + byte as usize;
                self.prog[t.pc].opcode() != Some(OpCode::Halt)
            }
            Some(OpCode::JumpTableRange) => {
                let (first, last) = instr.range();
                if first <= byte && byte <= last {
                    t.pc += 1 + (byte - first) as usize;
                    return self.prog[t.pc].opcode() != Some(OpCode::Halt);
                }
                false
            }
            // Dispatching a non-consuming instruction here means the
            // program is malformed; the thread dies silently.
            _ => false,
        }
    }

    /// Epsilon closure: executes non-consuming instructions until the
    /// thread either parks at a consuming instruction or dies.
    ///
    /// Returns `true` iff the thread survived and sits at a consuming
    /// instruction. Forked threads are appended to the active list, where
    /// the in-flight frame walk picks them up.
    fn closure(&mut self, t: &mut Thread, offset: u64) -> bool {
        loop {
            if t.pc >= self.prog.len() {
                return false;
            }
            let instr = self.prog[t.pc];
            match instr.opcode() {
                Some(OpCode::Jump) => {
                    t.pc = instr.operand() as usize;
                }
                Some(OpCode::Fork) => {
                    self.active.push(t.fork(instr.operand() as usize));
                    t.pc += 1;
                }
                Some(OpCode::CheckHalt | OpCode::CheckBranch) => {
                    let state = instr.operand() as usize;
                    if self.check_states[state] {
                        return false;
                    }
                    self.check_states.set(state, true);
                    self.check_states.set(0, true);
                    t.pc += 1;
                }
                Some(OpCode::Match) => {
                    t.label = instr.operand();
                    t.end = offset;
                    t.pc += 1;
                }
                Some(OpCode::SaveLabel) => {
                    t.label = instr.operand();
                    t.pc += 1;
                }
                Some(OpCode::Halt) | None => {
                    return false;
                }
                // A consuming instruction ends the closure.
                _ => {
                    return true;
                }
            }
        }
    }

    /// Candidate bookkeeping for a fresh match `(t.start, t.end)` on
    /// pattern `t.label`, emitting the previously held candidate when the
    /// new one proves it final.
    fn do_match<F: FnMut(SearchHit)>(&mut self, t: &Thread, hit_fn: &mut F) {
        let held = self.matches[t.label as usize];
        if held.0 == UNALLOCATED || (held.0 == t.start && held.1 < t.end) {
            // First candidate for this label, or a same-start extension.
            self.matches[t.label as usize] = (t.start, t.end);
        } else if held.1 <= t.start {
            // The new candidate starts at or past the held one's end, so
            // no extension of the held candidate can exist anymore.
            hit_fn(SearchHit {
                offset: held.0,
                length: held.1 - held.0,
                label: t.label,
            });
            self.matches[t.label as usize] = (t.start, t.end);
        }
        // Otherwise the new candidate overlaps the held one but starts
        // later: the held candidate is leftmost and the new one loses.
    }

    /// Chunk-end flush: one final epsilon pass at the end offset so that
    /// matches completed by a trailing epsilon chain can fire, then
    /// emission of every pending candidate.
    fn flush<F: FnMut(SearchHit)>(
        &mut self,
        offset: u64,
        hit_fn: &mut F,
    ) -> bool {
        if log_enabled!(Level::Trace) {
            trace!(
                "flush at {}: {:?}",
                offset,
                self.active.iter().collect::<Vec<_>>()
            );
        }

        let mut i = 0;
        while i < self.active.len() {
            let mut t = self.active.get(i);
            let alive = self.closure(&mut t, offset);
            if t.end == offset {
                self.do_match(&t, hit_fn);
            }
            if alive {
                self.next.push(t);
            }
            i += 1;
        }

        for label in 0..self.matches.len() {
            let (start, end) = self.matches[label];
            if start < UNALLOCATED {
                hit_fn(SearchHit {
                    offset: start,
                    length: end - start,
                    label: label as u32,
                });
                self.matches[label] = (UNALLOCATED, 0);
            }
        }

        self.cleanup();
        !self.active.is_empty()
    }

    /// End-of-frame bookkeeping: promote the parked threads and clear the
    /// check states if any were set this frame.
    fn cleanup(&mut self) {
        self.active.swap(&mut self.next);
        self.next.clear();
        if self.check_states[0] {
            self.check_states.fill(false);
        }
    }
}
