/*! A streaming multi-pattern regular expression engine for forensic
scanning of byte streams.

Patterns are compiled externally into a [`Program`], a linear stream of
fixed-width instructions encoding a Thompson NFA. A [`PikeVm`] executes the
program over raw bytes, simulating every pattern concurrently and reporting
each non-overlapping leftmost-longest match of each pattern as a
[`SearchHit`] with absolute byte offsets. Inputs are bytes, not codepoints;
callers lower their patterns to byte automata before compilation.

The engine is built for scanning evidence streams that don't fit in memory:
input is fed in chunks, and in-flight simulation state carries over between
[`PikeVm::search`] calls, so matches that straddle a chunk boundary are
found as if the input were contiguous.

# Example

```rust
use bytegrep::{ByteSet, Instr, PikeVm, Program, SearchHit};

// A program matching the single-byte pattern `a`, as the external
// compiler would emit it.
let mut first = ByteSet::default();
first.set(b'a' as usize, true);
let prog = Program::new(
    0,
    first,
    vec![Instr::make_lit(b'a'), Instr::make_match(0)],
);

let mut vm = PikeVm::new(&prog);
let mut hits = Vec::new();
let more = vm.search(b"xaxax", 0, |hit| hits.push(hit));

assert!(!more);
assert_eq!(
    hits,
    vec![
        SearchHit { offset: 1, length: 1, label: 0 },
        SearchHit { offset: 3, length: 1, label: 0 },
    ]
);
```
*/

#![deny(missing_docs)]

pub use errors::DecodeError;
pub use instr::ByteSet;
pub use instr::Instr;
pub use instr::OpCode;
pub use instr::BYTE_SET_WORDS;
pub use instr::MAX_OFFSET;
pub use pikevm::PikeVm;
pub use pikevm::SearchHit;
pub use program::Instrs;
pub use program::Program;
pub use smalllist::SmallList;
pub use thread::UNALLOCATED;

mod errors;
mod instr;
mod pikevm;
mod program;
mod smalllist;
mod thread;
