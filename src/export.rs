use async_trait::async_trait;
use bytes::Bytes;

/// Boundary to the export/rendering collaborator. The ledger hands over
/// plain column names and stringified rows and never learns the file
/// format on the other side.
#[async_trait]
pub trait ExportService: Send + Sync {
    async fn render_table(&self, columns: &[&str], rows: Vec<Vec<String>>)
        -> anyhow::Result<Bytes>;

    fn content_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;
}

/// CSV renderer, the shipped implementation.
#[derive(Clone)]
pub struct CsvExport;

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[async_trait]
impl ExportService for CsvExport {
    async fn render_table(
        &self,
        columns: &[&str],
        rows: Vec<Vec<String>>,
    ) -> anyhow::Result<Bytes> {
        let mut out = String::new();
        out.push_str(
            &columns
                .iter()
                .map(|c| escape_field(c))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
        for row in rows {
            out.push_str(
                &row.iter()
                    .map(|f| escape_field(f))
                    .collect::<Vec<_>>()
                    .join(","),
            );
            out.push('\n');
        }
        Ok(Bytes::from(out))
    }

    fn content_type(&self) -> &'static str {
        "text/csv"
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_header_and_rows() {
        let blob = CsvExport
            .render_table(
                &["name", "status"],
                vec![
                    vec!["Ada".into(), "PRESENT".into()],
                    vec!["Grace".into(), "LATE".into()],
                ],
            )
            .await
            .expect("render");
        assert_eq!(&blob[..], b"name,status\nAda,PRESENT\nGrace,LATE\n");
    }

    #[tokio::test]
    async fn quotes_fields_with_separators() {
        let blob = CsvExport
            .render_table(&["note"], vec![vec!["left early, said \"bye\"".into()]])
            .await
            .expect("render");
        assert_eq!(
            std::str::from_utf8(&blob).unwrap(),
            "note\n\"left early, said \"\"bye\"\"\"\n"
        );
    }
}
