//! Names of datalink menu entries.

/// Running counters used while naming the rows of one datalink table.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameCounters {
    /// Number of `#auxiliary` rows in the table.
    pub aux_total: usize,
    /// Auxiliary rows named so far.
    pub aux_count: usize,
    /// `#this` rows named so far.
    pub prime_count: usize,
}

/// Name of a datalink entry.
///
/// Arguments
/// -----------------
/// * `semantics`: Row semantics (`#this`, `#auxiliary`, ...).
/// * `url`: Access URL, used when the semantics give no name.
/// * `counters`: Counters of the table being named.
/// * `base_title`: Title of the source row, when the menu is shown under it.
///
/// Return
/// ----------
/// * `Primary product (#this)`, `Primary product (#this 2)`, `auxiliary: 1`, `preview`, ...
pub fn make_name(
    semantics: &str,
    url: Option<&str>,
    counters: &NameCounters,
    base_title: Option<&str>,
) -> String {
    if let Some(base) = base_title.filter(|b| !b.is_empty()) {
        return make_name_with_base_title(semantics, counters, base);
    }
    let numbered = if semantics == "#this" && counters.prime_count > 0 {
        format!("#this {}", counters.prime_count)
    } else {
        semantics.to_string()
    };
    let mut name = if semantics.starts_with("#this") {
        format!("Primary product ({numbered})")
    } else {
        semantics.to_string()
    };
    if let Some(stripped) = name.strip_prefix('#') {
        name = stripped.to_string();
    }
    if name == "auxiliary" && counters.aux_total > 1 {
        name = format!("{name}: {}", counters.aux_count);
    }
    if name.is_empty() {
        url.unwrap_or_default().to_string()
    } else {
        name
    }
}

fn make_name_with_base_title(semantics: &str, counters: &NameCounters, base: &str) -> String {
    if semantics.is_empty() {
        return base.to_string();
    }
    if semantics.starts_with("#this") {
        return if counters.prime_count < 1 {
            format!("{base} (#this)")
        } else {
            format!("{base} (#this {})", counters.prime_count)
        };
    }
    if semantics == "auxiliary" || semantics == "#auxiliary" {
        let n = if counters.aux_total > 0 {
            format!(" {}", counters.aux_count)
        } else {
            String::new()
        };
        return format!("auxiliary{n}: {base}");
    }
    let s = semantics.strip_prefix('#').unwrap_or(semantics);
    format!("{s}: {base}")
}
