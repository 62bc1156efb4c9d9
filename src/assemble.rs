//! Joining zonal aggregates back onto polygon tables and reporting.

use anyhow::{ensure, Context, Result};
use polars::frame::DataFrame;
use polars::prelude::*;

/// Join a zonal-statistics frame onto a layer table by name key and
/// restore the layer's row order. A join that drops rows means the key
/// columns disagree, which is an error rather than silent truncation.
pub fn attach_zonal(data: &DataFrame, zonal: &DataFrame, key: &str) -> Result<DataFrame> {
    let joined = data.inner_join(zonal, [key], [key])
        .with_context(|| format!("[assemble] join on {:?} failed", key))?
        .sort(["idx"], SortMultipleOptions::default())?;

    ensure!(
        joined.height() == data.height(),
        "[assemble] join on {:?} kept {} of {} rows; zonal keys do not match the layer",
        key,
        joined.height(),
        data.height(),
    );

    Ok(joined)
}

/// Replace null aggregates (polygons covering no valid cells) with zero.
/// Returns how many rows were filled so the caller can report it.
pub fn fill_null_with_zero(df: &mut DataFrame, column: &str) -> Result<usize> {
    let values = df.column(column)
        .with_context(|| format!("[assemble] missing column {:?}", column))?
        .f64()
        .with_context(|| format!("[assemble] column {:?} is not numeric", column))?;

    let nulls = values.null_count();
    if nulls > 0 {
        let filled: Vec<f64> = values.into_iter()
            .map(|v| v.unwrap_or(0.0))
            .collect();
        df.with_column(Column::new(column.into(), filled))?;
    }

    Ok(nulls)
}

/// Append `out = generated - collected`. A negative result means reported
/// collection exceeds the modeled generation; it is kept, not clamped.
pub fn uncollected_column(
    df: &mut DataFrame,
    generated: &str,
    collected: &str,
    out: &str,
) -> Result<()> {
    let gen = df.column(generated)
        .with_context(|| format!("[assemble] missing column {:?}", generated))?
        .f64()
        .with_context(|| format!("[assemble] column {:?} is not numeric", generated))?
        .into_iter()
        .map(|v| v.context("[assemble] null generated total; fill nulls before subtracting"))
        .collect::<Result<Vec<_>>>()?;

    let coll = df.column(collected)
        .with_context(|| format!("[assemble] missing column {:?}", collected))?
        .f64()
        .with_context(|| format!("[assemble] column {:?} is not numeric", collected))?
        .into_iter()
        .map(|v| v.context("[assemble] null collected volume in service layer"))
        .collect::<Result<Vec<_>>>()?;

    let diff: Vec<f64> = gen.iter().zip(&coll).map(|(g, c)| g - c).collect();
    df.with_column(Column::new(out.into(), diff))?;

    Ok(())
}

/// (name, value) rows sorted descending by value. The sort is stable, so
/// equal values keep their original relative order.
pub fn ranking(df: &DataFrame, name_col: &str, value_col: &str) -> Result<Vec<(String, f64)>> {
    let names = df.column(name_col)
        .with_context(|| format!("[assemble] missing column {:?}", name_col))?
        .str()
        .with_context(|| format!("[assemble] column {:?} is not text", name_col))?;
    let values = df.column(value_col)
        .with_context(|| format!("[assemble] missing column {:?}", value_col))?
        .f64()
        .with_context(|| format!("[assemble] column {:?} is not numeric", value_col))?;

    let mut rows: Vec<(String, f64)> = names.into_iter()
        .zip(values.into_iter())
        .map(|(name, value)| (name.unwrap_or("").to_string(), value.unwrap_or(0.0)))
        .collect();

    rows.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(rows)
}

/// Render a ranking to stdout, one `<name> : <tonnes> tonnes` line each.
pub fn print_ranking(title: &str, rows: &[(String, f64)]) {
    println!("{title}");
    for (name, value) in rows {
        println!("{} : {} tonnes", name, format_tonnes(*value));
    }
}

/// Round to whole tonnes and insert thousands separators.
pub fn format_tonnes(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded < 0 { format!("-{grouped}") } else { grouped }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("provider".into(), vec!["A", "B", "C"]),
            Column::new("collected".into(), vec![21.0, 120.0, 5.0]),
        ])
        .unwrap()
        .with_row_index("idx".into(), None)
        .unwrap()
    }

    fn zonal_frame(order: &[(&str, Option<f64>)]) -> DataFrame {
        DataFrame::new(vec![
            Column::new("provider".into(), order.iter().map(|r| r.0).collect::<Vec<_>>()),
            Column::new(
                "generated".into(),
                order.iter().map(|r| r.1).collect::<Vec<_>>(),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn attach_joins_by_key_not_position() {
        // Zonal rows arrive in a different order than the layer table.
        let zonal = zonal_frame(&[("C", Some(3.0)), ("A", Some(1.0)), ("B", Some(2.0))]);
        let joined = attach_zonal(&service_frame(), &zonal, "provider").unwrap();

        let gen = joined.column("generated").unwrap().f64().unwrap();
        assert_eq!(gen.get(0), Some(1.0)); // A
        assert_eq!(gen.get(1), Some(2.0)); // B
        assert_eq!(gen.get(2), Some(3.0)); // C
    }

    #[test]
    fn attach_rejects_key_mismatch() {
        let zonal = zonal_frame(&[("A", Some(1.0)), ("B", Some(2.0)), ("X", Some(9.0))]);
        assert!(attach_zonal(&service_frame(), &zonal, "provider").is_err());
    }

    #[test]
    fn null_aggregates_fill_to_zero_and_are_counted() {
        let zonal = zonal_frame(&[("A", Some(1.0)), ("B", None), ("C", None)]);
        let mut joined = attach_zonal(&service_frame(), &zonal, "provider").unwrap();

        let filled = fill_null_with_zero(&mut joined, "generated").unwrap();
        assert_eq!(filled, 2);
        let gen = joined.column("generated").unwrap().f64().unwrap();
        assert_eq!(gen.get(1), Some(0.0));
    }

    #[test]
    fn uncollected_subtracts_and_keeps_negatives() {
        let zonal = zonal_frame(&[("A", Some(100.0)), ("B", Some(100.0)), ("C", Some(5.0))]);
        let mut joined = attach_zonal(&service_frame(), &zonal, "provider").unwrap();
        uncollected_column(&mut joined, "generated", "collected", "uncollected").unwrap();

        let unc = joined.column("uncollected").unwrap().f64().unwrap();
        assert_eq!(unc.get(0), Some(79.0));
        assert_eq!(unc.get(1), Some(-20.0)); // collection exceeded the model
        assert_eq!(unc.get(2), Some(0.0));
    }

    #[test]
    fn uncollected_refuses_null_generated() {
        let zonal = zonal_frame(&[("A", Some(1.0)), ("B", None), ("C", Some(3.0))]);
        let mut joined = attach_zonal(&service_frame(), &zonal, "provider").unwrap();
        assert!(uncollected_column(&mut joined, "generated", "collected", "uncollected").is_err());
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let df = DataFrame::new(vec![
            Column::new("name".into(), vec!["w", "x", "y", "z"]),
            Column::new("value".into(), vec![2.0, 5.0, 2.0, 9.0]),
        ])
        .unwrap();

        let rows = ranking(&df, "name", "value").unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.0.as_str()).collect();
        assert_eq!(names, vec!["z", "x", "w", "y"]); // ties keep input order
        for pair in rows.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn tonnes_formatting_groups_thousands() {
        assert_eq!(format_tonnes(0.4), "0");
        assert_eq!(format_tonnes(999.4), "999");
        assert_eq!(format_tonnes(1234.6), "1,235");
        assert_eq!(format_tonnes(1_234_567.0), "1,234,567");
        assert_eq!(format_tonnes(-20.0), "-20");
        assert_eq!(format_tonnes(-1234.0), "-1,234");
    }
}
