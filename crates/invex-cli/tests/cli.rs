//! End-to-end tests of the `invex` binary. Model calls go to a local stub
//! of the Gemini endpoint.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use assert_cmd::Command;
use axum::{Json, Router, routing::post};
use image::{ImageBuffer, ImageFormat, Rgb};
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

const KEY_VAR: &str = "INVEX_TEST_API_KEY";

const REPLY: &str = r#"```json
{"emitente": {"razao_social": "Mercado Central", "cnpj": 12345678000190}, "data_emissao": "02/01/2024", "numero_nota": 881, "itens": [{"descricao": "Cafe", "quantidade": 2, "valor_unitario": 9.90, "valor_total": 19.80}], "valor_total_nota": 19.80, "impostos": {"icms": null}}
```"#;

/// Write a config that keeps every output inside `dir` and reads the key
/// from a variable only these tests touch.
fn write_config(dir: &Path) -> String {
    write_config_with_api(dir, None)
}

fn write_config_with_api(dir: &Path, api_base: Option<&str>) -> String {
    let path = dir.join("config.json");
    let mut gemini = json!({ "api_key_env": KEY_VAR });
    if let Some(base) = api_base {
        gemini["api_base"] = json!(base);
    }
    let config = json!({
        "gemini": gemini,
        "output": {
            "json_dir": dir.join("invoices_json"),
            "history_file": dir.join("invoices_data.csv"),
        }
    });
    fs::write(&path, config.to_string()).unwrap();
    path.display().to_string()
}

/// Serve a canned `generateContent` reply on a background thread and
/// return the base URL.
fn spawn_gemini_stub(text: &'static str) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().route(
        "/models/{action}",
        post(move |Json(_body): Json<Value>| async move {
            Json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": text}]},
                    "finishReason": "STOP"
                }]
            }))
        }),
    );

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    format!("http://{}", addr)
}

fn write_png(path: &Path) {
    let img = ImageBuffer::from_pixel(8, 8, Rgb([255u8, 255, 255]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
    fs::write(path, out).unwrap();
}

fn invex(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("invex").unwrap();
    cmd.current_dir(dir.path()).env_remove(KEY_VAR);
    for var in ["HTTP_PROXY", "http_proxy", "HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_missing_api_key_fails_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    fs::write(dir.path().join("nota.png"), b"not really a png").unwrap();

    invex(&dir)
        .args(["--config", &config, "extract", "nota.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(KEY_VAR))
        .stdout(predicate::str::contains("nota.png").not());

    assert!(!dir.path().join("invoices_data.csv").exists());
}

#[test]
fn test_unsupported_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

    invex(&dir)
        .env(KEY_VAR, "dummy-key")
        .args(["--config", &config, "extract", "notes.txt"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("notes.txt: unsupported format"))
        .stdout(predicate::str::contains("0 successful, 1 failed"));

    assert!(!dir.path().join("invoices_data.csv").exists());
    assert!(!dir.path().join("invoices_json").exists());
}

#[test]
fn test_extract_success() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_gemini_stub(REPLY);
    let config = write_config_with_api(dir.path(), Some(&base));
    write_png(&dir.path().join("nota.png"));

    invex(&dir)
        .env(KEY_VAR, "dummy-key")
        .args(["--config", &config, "extract", "--summary", "nota.png"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ nota.png ->"))
        .stdout(predicate::str::contains("nota.png.json"))
        .stdout(predicate::str::contains("Grand total: 19.80"))
        .stdout(predicate::str::contains("1 successful, 0 failed"));

    let artifact = fs::read_to_string(dir.path().join("invoices_json/nota.png.json")).unwrap();
    assert!(artifact.contains("\"valor_total_nota\": 19.80"));
    assert!(artifact.contains("\"cnpj\": 12345678000190"));

    let history = fs::read_to_string(dir.path().join("invoices_data.csv")).unwrap();
    let row = history.lines().nth(1).unwrap();
    assert!(row.contains("nota.png,Mercado Central,12345678000190,02/01/2024,881,1,19.80"));
}

#[test]
fn test_mixed_batch_reports_counts_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_gemini_stub(REPLY);
    let config = write_config_with_api(dir.path(), Some(&base));
    write_png(&dir.path().join("good.png"));
    fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

    invex(&dir)
        .env(KEY_VAR, "dummy-key")
        .args(["--config", &config, "extract", "good.png", "notes.txt", "missing*.pdf"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("✓ good.png ->"))
        .stdout(predicate::str::contains("notes.txt: unsupported format"))
        .stdout(predicate::str::contains("missing*.pdf: no files match pattern"))
        .stdout(predicate::str::contains("1 successful, 2 failed"));

    assert!(dir.path().join("invoices_json/good.png.json").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("invoices_data.csv"))
            .unwrap()
            .lines()
            .count(),
        2
    );
}

#[test]
fn test_history_without_extractions() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    invex(&dir)
        .args(["--config", &config, "history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No extractions yet"));
}

#[test]
fn test_history_shows_last_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let mut csv = String::from(
        "extraction_timestamp,source_file,company_name,tax_id,issue_date,invoice_number,item_count,grand_total\n",
    );
    for i in 1..=4 {
        csv.push_str(&format!(
            "2024-05-0{i}T09:00:00-03:00,nota{i}.pdf,Loja {i},,,,{i},{i}0.00\n"
        ));
    }
    fs::write(dir.path().join("invoices_data.csv"), csv).unwrap();

    invex(&dir)
        .args(["--config", &config, "history", "-n", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total invoices: 4"))
        .stdout(predicate::str::contains("nota4.pdf"))
        .stdout(predicate::str::contains("nota3.pdf"))
        .stdout(predicate::str::contains("nota2.pdf").not());
}

#[test]
fn test_config_set_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    invex(&dir)
        .args(["--config", &config, "config", "set", "gemini.model", "gemini-2.5-flash"])
        .assert()
        .success();

    invex(&dir)
        .args(["--config", &config, "config", "get", "gemini.model"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gemini-2.5-flash"));

    invex(&dir)
        .args(["--config", &config, "config", "set", "pdf.render_dpi", "high"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pdf.render_dpi"));

    invex(&dir)
        .args(["--config", &config, "config", "set", "gemini.nonexistent", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_config_init_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.json");
    let path_arg = path.display().to_string();

    invex(&dir)
        .args(["--config", &path_arg, "config", "init"])
        .assert()
        .success();
    assert!(path.exists());

    invex(&dir)
        .args(["--config", &path_arg, "config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}
