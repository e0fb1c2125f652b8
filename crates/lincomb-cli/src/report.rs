//! Console dumps and the appended result file.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use lincomb_core::GlobalMatrix;

/// Render a matrix the way the console dump shows it.
pub fn format_matrix(rank: usize, name: &str, matrix: &GlobalMatrix) -> String {
    let mut out = format!("Process {rank} - Matrix {name}:\n");
    for i in 0..matrix.dim() {
        for v in matrix.row(i) {
            let _ = write!(out, "{v:.6} ");
        }
        out.push('\n');
    }
    out
}

/// Write one result section: header, `N` rows, blank separator line.
pub fn write_result<W: Write>(out: &mut W, c: &GlobalMatrix, workers: usize) -> std::io::Result<()> {
    writeln!(out, "==== Resultado para {workers} ====")?;
    for i in 0..c.dim() {
        for v in c.row(i) {
            write!(out, "{v:.6} ")?;
        }
        writeln!(out)?;
    }
    writeln!(out)
}

/// Append one result section to `path`, creating the file if needed.
pub fn append_result(path: &Path, c: &GlobalMatrix, workers: usize) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open result file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write_result(&mut out, c, workers)?;
    out.flush()?;

    log::info!("Result appended to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lincomb_core::init::standard_operands;

    #[test]
    fn test_write_result_layout() {
        let c = GlobalMatrix::from_fn(2, |i, j| (3 * i + j) as f64).unwrap();
        let mut buf = Vec::new();
        write_result(&mut buf, &c, 4).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "==== Resultado para 4 ====\n0.000000 1.000000 \n3.000000 4.000000 \n\n"
        );
    }

    #[test]
    fn test_append_result_accumulates_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultado.txt");
        let c = GlobalMatrix::from_fn(1, |_, _| -1.5).unwrap();

        append_result(&path, &c, 1).unwrap();
        append_result(&path, &c, 2).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "==== Resultado para 1 ====\n-1.500000 \n\n==== Resultado para 2 ====\n-1.500000 \n\n"
        );
    }

    #[test]
    fn test_append_result_reports_unopenable_path() {
        let dir = tempfile::tempdir().unwrap();
        let c = GlobalMatrix::zeros(1);
        // A directory cannot be opened for appending.
        assert!(append_result(dir.path(), &c, 1).is_err());
    }

    #[test]
    fn test_format_matrix() {
        let (a, _) = standard_operands(2).unwrap();
        assert_eq!(
            format_matrix(0, "A", &a),
            "Process 0 - Matrix A:\n0.000000 1.000000 \n1.000000 2.000000 \n"
        );
    }
}
