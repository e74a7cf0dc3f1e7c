//! Built-in controller families.

mod eb2xx;
mod kh6xx;
mod kt;

pub use eb2xx::EB2XX;
pub use kh6xx::KH6XX;
pub use kt::KT;

use crate::registry::Family;

/// Families known to [`Registry::with_builtin`](crate::registry::Registry::with_builtin),
/// in detection order.
pub static BUILTIN: [&Family; 3] = [&EB2XX, &KH6XX, &KT];

/// Whether the annotation after the first `:` on line `index` starts with `prefix`.
pub(crate) fn annotation_starts_with(lines: &[&str], index: usize, prefix: &str) -> bool {
    lines
        .get(index)
        .and_then(|line| line.split_once(':'))
        .is_some_and(|(_, annotation)| annotation.trim().starts_with(prefix))
}
