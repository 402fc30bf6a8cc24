//! Process exit codes
//!
//! `0..=2` report the verdict of a completed run; the rest follow BSD
//! `sysexits.h` and report why a run could not complete.

pub const OK: i32 = 0;

/// At least one fit is not identifiable.
pub const NONIDENTIFIABLE: i32 = 1;

/// Some fits could not be evaluated; the others were.
pub const PARTIAL: i32 = 2;

pub const USAGE: i32 = 64;

/// Malformed fit, matrix or tree.
pub const DATAERR: i32 = 65;

pub const NOINPUT: i32 = 66;

/// Internal failure, e.g. a record that cannot be serialized.
pub const SOFTWARE: i32 = 70;

pub const IOERR: i32 = 74;

pub const CONFIG: i32 = 78;

/// Verdict of a run over many fits; failures outrank non-identifiability.
pub fn verdict(failed: usize, non_identifiable: usize) -> i32 {
    if failed > 0 {
        PARTIAL
    } else if non_identifiable > 0 {
        NONIDENTIFIABLE
    } else {
        OK
    }
}
