//! Menu ordering rules.
//!
//! * [`sort_menu`](crate::menu::ordering::sort_menu): `#this` entries first, the marked primary
//!   entry leading them, then every other entry in encounter order.
//! * [`apply_type_hint`](crate::menu::ordering::apply_type_hint): moves image entries of a file
//!   menu to the front or the back depending on the data type hint.

use std::cmp::Ordering;

use itertools::Itertools;

use crate::{
    candidate::{DataTypeHint, DisplayCandidate, DisplayType},
    constants::THIS_MARKER,
};

fn is_this(c: &DisplayCandidate) -> bool {
    c.semantics.as_deref() == Some("#this")
}

fn this_order(a: &DisplayCandidate, b: &DisplayCandidate) -> Ordering {
    let (ma, mb) = (a.name.contains(THIS_MARKER), b.name.contains(THIS_MARKER));
    match (ma, mb) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    }
}

/// Order a datalink menu.
///
/// Entries with `#this` semantics come first: the one whose name carries the `(#this)` marker
/// leads, the others follow in lexicographic name order. Remaining entries keep their encounter
/// order. A final stable pass moves an entry named exactly `(#this)` to the very front.
pub fn sort_menu(menu: Vec<DisplayCandidate>) -> Vec<DisplayCandidate> {
    let (this_items, others): (Vec<_>, Vec<_>) = menu.into_iter().partition(is_this);

    let (marked, rest): (Vec<_>, Vec<_>) = this_items
        .into_iter()
        .sorted_by(this_order)
        .chain(others)
        .partition(|c| c.name == THIS_MARKER);
    marked.into_iter().chain(rest).collect()
}

fn is_chart_like(c: &DisplayCandidate) -> bool {
    matches!(c.display_type(), DisplayType::Chart | DisplayType::ChartTable)
}

/// Reposition image entries according to the data type hint.
///
/// * no hint (or image/cube): images first
/// * `spectrum`: images last when a chart entry exists, else first
/// * `timeseries`: images last
pub fn apply_type_hint(menu: Vec<DisplayCandidate>, hint: &DataTypeHint) -> Vec<DisplayCandidate> {
    let images_last = match hint {
        DataTypeHint::Spectrum => menu.iter().any(is_chart_like),
        DataTypeHint::Timeseries => true,
        _ => false,
    };
    let (images, others): (Vec<_>, Vec<_>) = menu
        .into_iter()
        .partition(|c| c.display_type() == DisplayType::Image);
    if images_last {
        others.into_iter().chain(images).collect()
    } else {
        images.into_iter().chain(others).collect()
    }
}

#[cfg(test)]
mod ordering_test {
    use super::*;
    use crate::candidate::TableProduct;

    fn item(name: &str, sem: &str) -> DisplayCandidate {
        DisplayCandidate::download(name, "https://x.org/f", name, None).with_semantics(sem)
    }

    fn names(menu: &[DisplayCandidate]) -> Vec<&str> {
        menu.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_this_first_marker_leads() {
        let menu = vec![
            item("aux", "#auxiliary"),
            item("b-this", "#this"),
            item("a (#this)", "#this"),
        ];
        assert_eq!(names(&sort_menu(menu)), vec!["a (#this)", "b-this", "aux"]);
    }

    #[test]
    fn test_this_lexicographic_others_stable() {
        let menu = vec![
            item("z-prev", "#preview"),
            item("c", "#this"),
            item("a-aux", "#auxiliary"),
            item("b", "#this"),
        ];
        assert_eq!(names(&sort_menu(menu)), vec!["b", "c", "z-prev", "a-aux"]);
    }

    #[test]
    fn test_exact_marker_name_to_front() {
        let menu = vec![item("x", "#this"), item("(#this)", "#progenitor")];
        assert_eq!(names(&sort_menu(menu)), vec!["(#this)", "x"]);
    }

    #[test]
    fn test_apply_type_hint() {
        let img = DisplayCandidate::image("img", None, None, "i");
        let tbl = DisplayCandidate::table("tbl", TableProduct::default(), "t");
        let chart = DisplayCandidate::chart_table("chart", TableProduct::default(), "c");

        let m = apply_type_hint(vec![tbl.clone(), img.clone()], &DataTypeHint::Unspecified);
        assert_eq!(names(&m), vec!["img", "tbl"]);

        let m = apply_type_hint(vec![img.clone(), tbl.clone()], &DataTypeHint::Spectrum);
        assert_eq!(names(&m), vec!["img", "tbl"]);

        let m = apply_type_hint(vec![img.clone(), chart.clone()], &DataTypeHint::Spectrum);
        assert_eq!(names(&m), vec!["chart", "img"]);

        let m = apply_type_hint(vec![img, tbl], &DataTypeHint::Timeseries);
        assert_eq!(names(&m), vec!["tbl", "img"]);
    }
}
