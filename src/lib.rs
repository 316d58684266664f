/*!
# SynthAI

A document upload and analysis service, built in Rust.

## Overview

Users sign in, upload a CSV, Excel, DOCX or plain-text file, and get back:

- a preview of the content
- a short summary written by a hosted language model
- for tables, an anomaly report (empty cells, duplicated rows, duplicated values
  per column) and a bar chart of the status column when one exists
- a corrected copy of the file to download

Follow-up questions are answered by the language model against the last
uploaded text.

## Architecture

### Tabular core
- **table**: in-memory column-oriented table (`Value`, `Column`, `Table`)
- **loader**: CSV and workbook readers, text extraction and previews
- **anomaly**: the anomaly report
- **corrector**: numeric coercion, mean imputation, duplicate removal and
  persistence of the corrected table
- **saving**: `.xlsx` and `.docx` writers with atomic file replacement

### Web layer (`web` feature, on by default)
- **graph**: status distribution chart rendered to PNG
- **llm**: language model client (Gemini) and prompts
- **document**: paragraph-by-paragraph document correction
- **login**: user store with Argon2 hashes and the session store
- **app**: axum routes and shared state

## Configuration

See [`config::AppConfig::from_env`]. A `.env` file is honoured by the server binary.

## HTTP endpoints

- `GET /` - Login page
- `GET|POST /register` - Registration
- `POST /login`, `GET /logout` - Session management
- `GET /app` - Dashboard
- `POST /upload` - Upload and analyse a file (multipart field `file`)
- `GET /download_corrected/{filename}` - Download a corrected file
- `POST /ask` - Ask a question about the last upload (form field `question`)
*/

pub mod anomaly;
pub mod config;
pub mod corrector;
pub mod error;
pub mod loader;
pub mod saving;
pub mod table;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod document;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod llm;
#[cfg(feature = "web")]
pub mod login;

pub use anomaly::detect;
pub use config::AppConfig;
pub use corrector::{Correction, CorrectionError, correct};
pub use error::AppError;
pub use table::{Column, Table, Value};

#[cfg(feature = "web")]
pub use graph::chart_for;
