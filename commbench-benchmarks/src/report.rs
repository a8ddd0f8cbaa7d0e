//! Output sink for benchmark results.
use crate::format::MetricFormatter;
use crate::op::OpKind;
use crate::sample::MetricSample;
use crate::Result;
use std::io::Write;

/// Writes result tables, but only on the reporting rank.
///
/// Measurement always runs on every rank; whether anything is emitted is
/// decided here from the predicate given at construction.
pub struct Reporter<W: Write> {
    out: W,
    formatter: MetricFormatter,
    reporting: bool,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, formatter: MetricFormatter, reporting: bool) -> Reporter<W> {
        Reporter {
            out,
            formatter,
            reporting,
        }
    }

    /// Reporter that emits on rank 0 only.
    pub fn for_rank(out: W, formatter: MetricFormatter, rank: usize) -> Reporter<W> {
        Reporter::new(out, formatter, rank == 0)
    }

    pub fn is_reporting(&self) -> bool {
        self.reporting
    }

    pub fn header(&mut self, op: OpKind) -> Result<()> {
        let header = self.formatter.header(op);
        self.line(&header)
    }

    pub fn record(&mut self, sample: &MetricSample) -> Result<()> {
        let row = self.formatter.row(sample);
        self.line(&row)
    }

    /// Emit a line on the reporting rank.
    pub fn line(&mut self, text: &str) -> Result<()> {
        if self.reporting {
            writeln!(self.out, "{}", text)?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// Emit a line regardless of rank.
    pub fn debug_line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", text)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
