//! Integration tests for the extraction pipeline.
//!
//! These run the full Parse → Structure flow through [`Extractor`] against
//! an in-memory document backend and a scripted model service, so they need
//! neither libpdfium nor an API key.
//!
//! Run with:
//!   cargo test --test pipeline

use futures::future::join_all;
use opsbot_extract::prompts::NO_USABLE_TEXT_OUTPUT;
use opsbot_extract::{
    ContractTask, DocumentBackend, ExtractError, ExtractionConfig, ExtractionProfile,
    ExtractionProgressCallback, ExtractionResult, Extractor, Grid, Metadata, ModelService,
    PageSource, Phase, ScriptedModelService, TableSettings, TableStrategy,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

const PDF: &[u8] = b"%PDF-1.7\n% in-memory fixture\n";

/// One page of canned content.
#[derive(Clone, Default)]
struct FakePage {
    text: Option<String>,
    grids: Vec<Grid>,
    tables_error: Option<String>,
}

impl FakePage {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn with_grid(mut self, grid: Grid) -> Self {
        self.grids.push(grid);
        self
    }
}

/// Opens every file as the same canned document and records the paths it saw.
#[derive(Default)]
struct MemoryBackend {
    pages: Vec<FakePage>,
    open_error: Option<String>,
    opened: Mutex<Vec<PathBuf>>,
}

impl MemoryBackend {
    fn with_pages(pages: Vec<FakePage>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            ..Default::default()
        })
    }

    fn failing(detail: &str) -> Arc<Self> {
        Arc::new(Self {
            open_error: Some(detail.into()),
            ..Default::default()
        })
    }

    fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }
}

struct MemoryPages<'a> {
    pages: &'a [FakePage],
}

impl PageSource for MemoryPages<'_> {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Result<Option<String>, String> {
        Ok(self.pages[index].text.clone())
    }

    fn page_tables(&self, index: usize, _settings: &TableSettings) -> Result<Vec<Grid>, String> {
        let page = &self.pages[index];
        match &page.tables_error {
            Some(e) => Err(e.clone()),
            None => Ok(page.grids.clone()),
        }
    }
}

impl DocumentBackend for MemoryBackend {
    fn open(
        &self,
        path: &Path,
        _password: Option<&str>,
        visit: &mut dyn FnMut(&dyn PageSource),
    ) -> Result<(), ExtractError> {
        assert!(path.exists(), "staged file must exist while the backend reads it");
        self.opened.lock().unwrap().push(path.to_path_buf());
        match &self.open_error {
            Some(detail) => Err(ExtractError::CorruptPdf {
                detail: detail.clone(),
            }),
            None => {
                visit(&MemoryPages { pages: &self.pages });
                Ok(())
            }
        }
    }
}

fn grid(rows: &[&[&str]]) -> Grid {
    rows.iter()
        .map(|row| row.iter().map(|c| Some(c.to_string())).collect())
        .collect()
}

fn extractor(
    backend: Arc<MemoryBackend>,
    service: Arc<ScriptedModelService>,
    config: ExtractionConfig,
) -> Extractor {
    Extractor::with_services(backend, service, config)
}

fn default_extractor(
    backend: Arc<MemoryBackend>,
    service: Arc<ScriptedModelService>,
) -> Extractor {
    extractor(backend, service, ExtractionConfig::default())
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn document_without_text_skips_model() {
    let backend = MemoryBackend::with_pages(vec![FakePage::default(), FakePage::text("  \n ")]);
    let service = Arc::new(ScriptedModelService::replying("{}"));
    let extractor = default_extractor(backend, service.clone());

    let result = extractor.run_extraction(PDF.to_vec(), Metadata::new()).await;

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "text": "",
            "tables": [],
            "structuredOutput": NO_USABLE_TEXT_OUTPUT,
        })
    );
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn table_on_first_page_is_tagged_page_one() {
    let backend = MemoryBackend::with_pages(vec![
        FakePage::text("Cargo manifest").with_grid(grid(&[
            &["Lot", "Weight"],
            &["L-01", "2500 MT"],
            &["L-02", "2500 MT"],
        ])),
        FakePage::text("Port of Discharge: Douala"),
    ]);
    let service = Arc::new(ScriptedModelService::replying(
        "```json\n{\"vessel_name\": \"MV Alba\"}\n```",
    ));
    let extractor = default_extractor(backend, service.clone());

    let result = extractor
        .run_extraction(PDF.to_vec(), Metadata::with_filename("manifest.pdf"))
        .await;

    let ExtractionResult::Success {
        text,
        tables,
        structured_output,
    } = result
    else {
        panic!("expected success, got {result:?}");
    };
    assert_eq!(
        text,
        "--- Page 1 ---\nCargo manifest\n\n--- Page 2 ---\nPort of Discharge: Douala"
    );
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].page, 1);
    assert_eq!(tables[0].columns, vec!["Lot", "Weight"]);
    assert_eq!(tables[0].rows.len(), 2);
    assert_eq!(structured_output, "{\"vessel_name\": \"MV Alba\"}");

    let request = &service.requests()[0];
    assert!(request.user_text().contains("File name: 'manifest.pdf'"));
    assert!(request.user_text().contains("Port of Discharge: Douala"));
}

#[tokio::test]
async fn sparse_grids_are_dropped() {
    let backend = MemoryBackend::with_pages(vec![FakePage::text("Totals").with_grid(vec![
        vec![Some("Lot".into()), None, None],
        vec![None, None, Some(" ".into())],
    ])]);
    let service = Arc::new(ScriptedModelService::replying("{}"));
    let extractor = default_extractor(backend, service);

    let state = extractor.run_pipeline(PDF.to_vec(), Metadata::new()).await;

    assert_eq!(state.phase, Phase::Done);
    assert!(state.tables.is_empty());
    assert_eq!(state.pages[0].strategy, TableStrategy::None);
}

#[tokio::test]
async fn open_failure_reports_cause() {
    let backend = MemoryBackend::failing("trailer not found");
    let service = Arc::new(ScriptedModelService::replying("{}"));
    let extractor = default_extractor(backend.clone(), service.clone());

    let result = extractor.run_extraction(PDF.to_vec(), Metadata::new()).await;

    let error = result.error().expect("failure");
    assert!(error.starts_with("Failed to process the PDF: "), "{error}");
    assert!(error.contains("trailer not found"), "{error}");
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json.as_object().unwrap().len(), 1);
    assert_eq!(service.calls(), 0);
    assert!(backend.opened().iter().all(|p| !p.exists()));
}

#[tokio::test]
async fn non_pdf_bytes_fail_before_backend() {
    let backend = MemoryBackend::with_pages(vec![FakePage::text("x")]);
    let extractor = default_extractor(
        backend.clone(),
        Arc::new(ScriptedModelService::replying("{}")),
    );

    let result = extractor
        .run_extraction(b"<html>not a pdf</html>".to_vec(), Metadata::new())
        .await;

    assert!(result.error().unwrap().contains("not a valid PDF"));
    assert!(backend.opened().is_empty());
}

#[tokio::test]
async fn page_table_failure_is_not_fatal() {
    let backend = MemoryBackend::with_pages(vec![FakePage {
        text: Some("Bill of Lading B/L-7781".into()),
        tables_error: Some("malformed path object".into()),
        ..Default::default()
    }]);
    let service = Arc::new(ScriptedModelService::replying("{}"));
    let extractor = default_extractor(backend, service.clone());

    let state = extractor.run_pipeline(PDF.to_vec(), Metadata::new()).await;

    assert_eq!(state.phase, Phase::Done);
    assert_eq!(state.pages[0].strategy, TableStrategy::Error);
    assert_eq!(state.pages[0].errors.len(), 1);
    assert_eq!(service.calls(), 1);
}

// ── Model service ────────────────────────────────────────────────────────────

#[tokio::test]
async fn model_failure_becomes_error() {
    let backend = MemoryBackend::with_pages(vec![FakePage::text("Vessel: MV Alba")]);
    let service = Arc::new(ScriptedModelService::failing("rate limited"));
    let extractor = default_extractor(backend, service);

    let result = extractor.run_extraction(PDF.to_vec(), Metadata::new()).await;

    let error = result.error().unwrap();
    assert!(error.starts_with("Model service call failed: "), "{error}");
    assert!(error.contains("rate limited"), "{error}");
}

#[tokio::test(start_paused = true)]
async fn slow_model_times_out() {
    let backend = MemoryBackend::with_pages(vec![FakePage::text("Vessel: MV Alba")]);
    let service =
        Arc::new(ScriptedModelService::replying("{}").with_delay(Duration::from_secs(30)));
    let config = ExtractionConfig::builder()
        .model_timeout_secs(Some(2))
        .build()
        .unwrap();
    let extractor = extractor(backend, service, config);

    let result = extractor.run_extraction(PDF.to_vec(), Metadata::new()).await;

    assert!(result.error().unwrap().contains("timed out"));
}

#[tokio::test]
async fn prompt_embeds_exactly_the_char_budget() {
    let body = "é".repeat(100);
    let backend = MemoryBackend::with_pages(vec![FakePage::text(&body)]);
    let service = Arc::new(ScriptedModelService::replying("summary"));
    let config = ExtractionConfig::builder()
        .profile(ExtractionProfile::Summary)
        .char_budget(40)
        .build()
        .unwrap();
    let extractor = extractor(backend, service.clone(), config);

    extractor.run_extraction(PDF.to_vec(), Metadata::new()).await;
    extractor.run_extraction(PDF.to_vec(), Metadata::new()).await;

    let requests = service.requests();
    let user = requests[0].user_text();
    // "--- Page 1 ---\n" is 15 characters; the rest of the budget is body.
    let expected = format!("--- Page 1 ---\n{}", "é".repeat(25));
    assert!(user.ends_with(&expected), "{user}");
    assert!(!user.contains(&"é".repeat(26)));
    assert_eq!(user, requests[1].user_text());
}

// ── Resources & concurrency ──────────────────────────────────────────────────

#[tokio::test]
async fn staged_files_removed_on_every_path() {
    let ok = MemoryBackend::with_pages(vec![FakePage::text("Lot 4")]);
    let bad = MemoryBackend::failing("bad xref");
    let service = Arc::new(ScriptedModelService::replying("{}"));

    default_extractor(ok.clone(), service.clone())
        .run_extraction(PDF.to_vec(), Metadata::new())
        .await;
    default_extractor(bad.clone(), service)
        .run_extraction(PDF.to_vec(), Metadata::new())
        .await;

    let paths: Vec<PathBuf> = ok.opened().into_iter().chain(bad.opened()).collect();
    assert_eq!(paths.len(), 2);
    for path in paths {
        assert!(!path.exists(), "{} left behind", path.display());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invocations_are_independent() {
    let backend = MemoryBackend::with_pages(vec![FakePage::text("Cargo: urea")]);
    let service = Arc::new(ScriptedModelService::replying("{\"cargo_type\": \"urea\"}"));
    let extractor = default_extractor(backend.clone(), service.clone());

    let runs = (0..8).map(|i| {
        extractor.run_extraction(PDF.to_vec(), Metadata::with_filename(format!("lot-{i}.pdf")))
    });
    let results = join_all(runs).await;

    assert!(results.iter().all(ExtractionResult::is_success));
    assert_eq!(service.calls(), 8);

    let mut filenames: Vec<String> = service
        .requests()
        .iter()
        .map(|r| r.user_text())
        .filter_map(|u| {
            u.split("File name: '")
                .nth(1)
                .and_then(|rest| rest.split('\'').next())
                .map(str::to_string)
        })
        .collect();
    filenames.sort();
    filenames.dedup();
    assert_eq!(filenames.len(), 8);

    let mut paths = backend.opened();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 8, "each invocation stages its own file");
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl ExtractionProgressCallback for EventLog {
    fn on_stage_start(&self, stage: &str) {
        self.0.lock().unwrap().push(format!("start {stage}"));
    }
    fn on_document_opened(&self, total_pages: usize) {
        self.0.lock().unwrap().push(format!("opened {total_pages}"));
    }
    fn on_page_extracted(&self, page_num: usize, _total: usize, strategy: TableStrategy) {
        self.0
            .lock()
            .unwrap()
            .push(format!("page {page_num} {}", strategy.as_str()));
    }
    fn on_stage_complete(&self, stage: &str, success: bool) {
        self.0.lock().unwrap().push(format!("done {stage} {success}"));
    }
}

#[tokio::test]
async fn progress_events_in_order() {
    let backend = MemoryBackend::with_pages(vec![
        FakePage::text("a").with_grid(grid(&[&["x", "y"], &["1", "2"]])),
        FakePage::text("b"),
    ]);
    let log = Arc::new(EventLog::default());
    let config = ExtractionConfig::builder()
        .progress_callback(log.clone())
        .build()
        .unwrap();
    let extractor = extractor(backend, Arc::new(ScriptedModelService::replying("{}")), config);

    extractor.run_extraction(PDF.to_vec(), Metadata::new()).await;

    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            "start parse",
            "opened 2",
            "page 1 lines",
            "page 2 none",
            "done parse true",
            "start structure",
            "done structure true",
        ]
    );
}

#[tokio::test]
async fn failed_parse_skips_structure_events() {
    let log = Arc::new(EventLog::default());
    let config = ExtractionConfig::builder()
        .progress_callback(log.clone())
        .build()
        .unwrap();
    let extractor = extractor(
        MemoryBackend::failing("encrypted"),
        Arc::new(ScriptedModelService::replying("{}")),
        config,
    );

    extractor.run_extraction(PDF.to_vec(), Metadata::new()).await;

    assert_eq!(
        *log.0.lock().unwrap(),
        vec!["start parse", "done parse false"]
    );
}

// ── Contracts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn contract_text_is_segmented_and_reviewed() {
    let service = Arc::new(ScriptedModelService::replying(
        "\n- Payment schedule is front-loaded\n",
    ));
    let extractor = default_extractor(MemoryBackend::with_pages(vec![]), service.clone());
    let raw = "SERVICE AGREEMENT\nProject Overview:\nYard management\u{a0}system.\n\
               Payment Terms: 50% on signature.\nTechnical Infrastructure: client servers.\n\
               Signature: ______";

    let (sections, review) = extractor
        .analyze_contract_text(raw, ContractTask::HighlightRisks)
        .await
        .unwrap();

    assert_eq!(
        sections.project_overview.as_deref(),
        Some("Yard management system.")
    );
    assert_eq!(sections.payment_terms.as_deref(), Some("50% on signature."));
    assert_eq!(
        sections.technical_notes.as_deref(),
        Some("client servers.")
    );
    assert_eq!(sections.timeline, None);
    assert_eq!(review, "- Payment schedule is front-loaded");

    let prompt = service.requests()[0].user_text();
    assert!(prompt.contains("### TIMELINE:\n[Not Provided]"));
    assert!(prompt.contains("### PAYMENT_TERMS:\n50% on signature."));
}

#[tokio::test]
async fn extract_document_does_not_call_model() {
    let backend = MemoryBackend::with_pages(vec![FakePage::text("Deliverables: dashboards")]);
    let service = Arc::new(ScriptedModelService::replying("{}"));
    let extractor = default_extractor(backend, service.clone());

    let extraction = extractor.extract_document(PDF).await.unwrap();

    assert_eq!(extraction.total_pages, 1);
    assert_eq!(extraction.plain_text(), "Deliverables: dashboards");
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn model_service_is_shared_not_copied() {
    let service = Arc::new(ScriptedModelService::replying("{}"));
    let extractor = default_extractor(MemoryBackend::with_pages(vec![]), service.clone());
    let dyn_service: Arc<dyn ModelService> = service;
    assert!(Arc::ptr_eq(extractor.model_service(), &dyn_service));
}
