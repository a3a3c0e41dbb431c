use tracing::{debug, info};

use crate::analytics::{fetch_monthly_views, ReportSource};
use crate::cfg::Cfg;
use crate::cms::{fetch_post_meta, ContentSource};
use crate::csv_sink;
use crate::error::Result;
use crate::sheets::{write_sheet, SpreadsheetApi};
use crate::transform::{build_author_rows, build_blog_rows, to_table, TableRow};

/// Row counts of one completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub blog_rows: usize,
    pub author_rows: usize,
}

/// Fetch metadata and views, then rebuild the blogs and authors sheets in
/// that order. The first failure aborts the rest of the run.
pub async fn run_job<C, A, S>(
    cfg: &Cfg,
    cms: &C,
    analytics: &A,
    sheets: &S,
) -> Result<RunSummary>
where
    C: ContentSource + ?Sized,
    A: ReportSource + ?Sized,
    S: SpreadsheetApi + ?Sized,
{
    info!("Starting job execution");
    if cfg.dry_run {
        info!("Dry run: the spreadsheet will not be modified");
    }

    let prefix = cfg.path_prefix();
    let (meta, views) = tokio::try_join!(
        fetch_post_meta(cms, cfg.cms.page_size),
        fetch_monthly_views(
            analytics,
            &cfg.property_id,
            cfg.start_date,
            &prefix,
            cfg.row_limit
        ),
    )?;

    let blogs = build_blog_rows(&meta, &views);
    let blog_rows = publish(cfg, sheets, &cfg.blogs_sheet, &blogs).await?;
    info!("{} sheet updated: {} rows", cfg.blogs_sheet, blog_rows);

    let authors = build_author_rows(&meta, &views);
    let author_rows = publish(cfg, sheets, &cfg.authors_sheet, &authors).await?;
    info!("{} sheet updated: {} rows", cfg.authors_sheet, author_rows);

    Ok(RunSummary {
        blog_rows,
        author_rows,
    })
}

async fn publish<S, R>(cfg: &Cfg, sheets: &S, name: &str, rows: &[R]) -> Result<usize>
where
    S: SpreadsheetApi + ?Sized,
    R: TableRow,
{
    if let Some(dir) = &cfg.csv_dir {
        csv_sink::write_table(dir, name, rows)?;
    }

    if cfg.dry_run {
        debug!("Skipping write of {} rows to {}", rows.len(), name);
        return Ok(rows.len());
    }

    let (header, body) = to_table(rows);
    write_sheet(sheets, &cfg.sheet_id, name, header, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{CellValue, ReportRequest, ReportResponse, ReportRow};
    use crate::args::Args;
    use crate::cfg::RawSettings;
    use crate::cms::{AuthorRef, ContentItem, ContentPage};
    use crate::error::JobError;
    use crate::sheets::fake::{Call, FakeSheets};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    struct StaticCms(Vec<(&'static str, &'static str, Option<&'static str>)>);

    #[async_trait]
    impl ContentSource for StaticCms {
        async fn fetch_page(&self, offset: u64, limit: u32) -> Result<ContentPage> {
            let contents = self
                .0
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .map(|(id, title, author)| ContentItem {
                    id: id.to_string(),
                    title: title.to_string(),
                    author: author.map(|name| AuthorRef {
                        name: Some(name.to_string()),
                    }),
                })
                .collect();
            Ok(ContentPage {
                contents,
                total_count: self.0.len() as u64,
            })
        }
    }

    struct StaticReport(Vec<(&'static str, &'static str, &'static str)>);

    #[async_trait]
    impl ReportSource for StaticReport {
        async fn run_report(
            &self,
            _property: &str,
            _request: &ReportRequest,
        ) -> Result<ReportResponse> {
            let cell = |v: &str| CellValue {
                value: Some(v.to_string()),
            };
            let rows = self
                .0
                .iter()
                .map(|(ym, path, views)| ReportRow {
                    dimension_values: vec![cell(ym), cell(path)],
                    metric_values: vec![cell(views)],
                })
                .collect();
            Ok(ReportResponse {
                rows,
                row_count: self.0.len() as u64,
            })
        }
    }

    fn test_cfg(args: Args) -> Cfg {
        let raw = RawSettings {
            ga_property_id: Some("123".to_string()),
            google_credentials: Some("{}".to_string()),
            microcms_service: Some("blog".to_string()),
            sheets_id: Some("sheet".to_string()),
            ..Default::default()
        };
        Cfg::resolve(raw, args).unwrap()
    }

    #[tokio::test]
    async fn writes_both_sheets_in_order() {
        let cms = StaticCms(vec![
            ("post-a", "A", Some("Alice")),
            ("post-c", "C", Some("Alice")),
            ("post-d", "D", None),
        ]);
        let ga = StaticReport(vec![
            ("202501", "/articles/post-a/", "10"),
            ("202501", "/articles/post-b", "5"),
            ("202501", "/articles/post-c", "7"),
            ("202412", "/articles/post-d", "2"),
        ]);
        let sheets = FakeSheets::with_sheets(&["blogs"]);

        let summary = run_job(&test_cfg(Args::default()), &cms, &ga, &sheets)
            .await
            .unwrap();
        assert_eq!(
            summary,
            RunSummary {
                blog_rows: 3,
                author_rows: 2,
            }
        );

        assert_eq!(
            sheets.calls(),
            vec![
                Call::Titles,
                Call::Clear("blogs!A:Z".to_string()),
                Call::Write("blogs!A1".to_string(), 4),
                Call::Titles,
                Call::Add("authors".to_string()),
                Call::Clear("authors!A:Z".to_string()),
                Call::Write("authors!A1".to_string(), 3),
            ]
        );

        let values = sheets.values.lock().unwrap();
        assert_eq!(
            values["blogs"],
            vec![
                vec![
                    json!("slug"),
                    json!("title"),
                    json!("author"),
                    json!("month"),
                    json!("views"),
                ],
                vec![json!("post-a"), json!("A"), json!("Alice"), json!("2025-01"), json!(10)],
                vec![json!("post-c"), json!("C"), json!("Alice"), json!("2025-01"), json!(7)],
                vec![json!("post-d"), json!("D"), json!(""), json!("2024-12"), json!(2)],
            ]
        );
        assert_eq!(
            values["authors"],
            vec![
                vec![json!("author"), json!("month"), json!("views")],
                vec![json!("Alice"), json!("2025-01"), json!(17)],
                vec![json!("unknown"), json!("2024-12"), json!(2)],
            ]
        );
    }

    #[tokio::test]
    async fn empty_metadata_aborts_before_any_write() {
        let cms = StaticCms(vec![]);
        let ga = StaticReport(vec![("202501", "/articles/a", "1")]);
        let sheets = FakeSheets::default();

        let err = run_job(&test_cfg(Args::default()), &cms, &ga, &sheets)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::EmptyMetadata));
        assert!(sheets.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_blogs_write_skips_authors() {
        let cms = StaticCms(vec![("a", "A", Some("Alice"))]);
        let ga = StaticReport(vec![("202501", "/articles/a", "1")]);
        let sheets = FakeSheets {
            fail_writes: true,
            ..Default::default()
        };

        assert!(run_job(&test_cfg(Args::default()), &cms, &ga, &sheets).await.is_err());
        assert!(!sheets
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Add(name) if name == "authors")));
    }

    #[tokio::test]
    async fn dry_run_exports_csv_without_touching_sheets() {
        let tmp = TempDir::new().unwrap();
        let args = Args {
            dry_run: true,
            csv_dir: Some(tmp.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        let cms = StaticCms(vec![("a", "A", Some("Alice"))]);
        let ga = StaticReport(vec![("202501", "/articles/a", "4")]);
        let sheets = FakeSheets::default();

        let summary = run_job(&test_cfg(args), &cms, &ga, &sheets).await.unwrap();
        assert_eq!(summary.blog_rows, 1);
        assert!(sheets.calls().is_empty());

        let blogs = std::fs::read_to_string(tmp.path().join("blogs.csv")).unwrap();
        assert_eq!(blogs, "slug,title,author,month,views\na,A,Alice,2025-01,4\n");
        let authors = std::fs::read_to_string(tmp.path().join("authors.csv")).unwrap();
        assert_eq!(authors, "author,month,views\nAlice,2025-01,4\n");
    }
}
