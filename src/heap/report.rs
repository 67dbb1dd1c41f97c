use crate::heap::diagnostic::{Sink, emit};
use crate::heap::index::AllocationIndex;
use crate::heap::spinlock::SpinLock;

const RULE: &str = "=====================";
const SUBRULE: &str = "--------------";

/// What a leak report found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LeakSummary {
    pub blocks: usize,
    pub bytes: usize,
}

impl LeakSummary {
    pub const fn is_clean(&self) -> bool {
        self.blocks == 0
    }
}

fn section(
    sink: &mut dyn Sink,
    title: &str,
    index: &AllocationIndex,
    summary: &mut LeakSummary,
) {
    if index.is_empty() {
        return;
    }
    emit(sink, format_args!("{title}"));
    emit(sink, format_args!("{SUBRULE}"));
    index.for_each(|record| {
        emit(
            sink,
            format_args!(
                "{}({}): {} bytes at {:#018x}",
                record.origin.file, record.origin.line, record.len, record.address
            ),
        );
        summary.blocks += 1;
        summary.bytes += record.len;
    });
    emit(sink, format_args!(""));
}

/// Print every record still live in either index.
///
/// Both locks are held for the whole report so the listing and the total
/// describe one moment in time. Nothing is freed.
pub(crate) fn write(
    sink: &mut dyn Sink,
    scalar: &SpinLock<AllocationIndex>,
    vector: &SpinLock<AllocationIndex>,
) -> LeakSummary {
    let scalar = scalar.lock();
    let vector = vector.lock();
    let mut summary = LeakSummary::default();
    if scalar.is_empty() && vector.is_empty() {
        return summary;
    }

    emit(sink, format_args!("Memory leaks detected"));
    emit(sink, format_args!("{RULE}"));
    emit(sink, format_args!(""));
    section(sink, "Scalar objects", &scalar, &mut summary);
    section(sink, "Vector objects", &vector, &mut summary);
    emit(sink, format_args!("{RULE}"));
    emit(sink, format_args!("Total bytes: {}", summary.bytes));
    emit(sink, format_args!("{RULE}"));
    summary
}
