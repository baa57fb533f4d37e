use anyhow::Context;
use chrono::Utc;
use report_config::DownloadConfig;
use report_models::SearchCriterion;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One file observed during a poll. Scanned fresh each attempt - the
/// browser may still be writing it, so nothing here is cached across polls.
#[derive(Debug, Clone)]
pub struct DownloadCandidate {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl DownloadCandidate {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Poll the candidate directories until a file matching the criterion
/// appears, then move it into the canonical artifact location.
///
/// `Ok(None)` after the attempt budget means "unconfirmed" - slow
/// downloads are a known false negative, so the caller must not report it
/// as a hard failure.
pub async fn confirm_download(
    candidate_dirs: &[PathBuf],
    criterion: &SearchCriterion,
    cfg: &DownloadConfig,
    artifact_dir: &Path,
) -> anyhow::Result<Option<PathBuf>> {
    let window = Duration::from_secs(cfg.recency_window_secs);
    let interval = Duration::from_secs(cfg.poll_interval_secs);

    for attempt in 1..=cfg.poll_attempts {
        let candidates = scan_candidates(candidate_dirs, &cfg.extension, window, SystemTime::now());
        debug!(
            "Download poll attempt {}/{}: {} recent .{} candidate(s)",
            attempt,
            cfg.poll_attempts,
            candidates.len(),
            cfg.extension
        );

        if let Some(candidate) = select_candidate(&candidates, criterion, cfg.fuzzy_word_threshold) {
            info!(
                "Confirmed download candidate after {} attempt(s): {:?}",
                attempt, candidate.path
            );
            let canonical = finalize_artifact(candidate, criterion, artifact_dir, &cfg.extension)?;
            return Ok(Some(canonical));
        }

        if attempt < cfg.poll_attempts {
            sleep(interval).await;
        }
    }

    warn!(
        "No matching download appeared after {} attempts ({}s apart); treating as unconfirmed",
        cfg.poll_attempts, cfg.poll_interval_secs
    );
    Ok(None)
}

/// List files with the expected extension modified within the recency
/// window, across every candidate directory. Missing directories are
/// skipped silently - the browser may simply not have created one yet.
pub fn scan_candidates(
    dirs: &[PathBuf],
    extension: &str,
    window: Duration,
    now: SystemTime,
) -> Vec<DownloadCandidate> {
    let mut candidates = Vec::new();

    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(extension) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if !is_recent(modified, now, window) {
                continue;
            }
            candidates.push(DownloadCandidate {
                path,
                size: metadata.len(),
                modified,
            });
        }
    }

    candidates
}

pub fn is_recent(modified: SystemTime, now: SystemTime, window: Duration) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age <= window,
        // Clock skew put the mtime in the future; treat as fresh
        Err(_) => true,
    }
}

/// Pick the best candidate for the criterion. Precedence: normalized title
/// substring, then fuzzy word overlap, then (for opaque identifiers) the id
/// itself in the filename, finally most-recent-file as the weakest signal.
pub fn select_candidate<'a>(
    candidates: &'a [DownloadCandidate],
    criterion: &SearchCriterion,
    fuzzy_threshold: f64,
) -> Option<&'a DownloadCandidate> {
    if candidates.is_empty() {
        return None;
    }

    match criterion {
        SearchCriterion::Title(title) => {
            if let Some(hit) = most_recent(candidates.iter().filter(|c| {
                filename_matches_title(&c.file_name(), title)
            })) {
                return Some(hit);
            }
            most_recent(candidates.iter().filter(|c| {
                filename_fuzzy_matches_title(&c.file_name(), title, fuzzy_threshold)
            }))
        }
        SearchCriterion::Id(id) => {
            if let Some(hit) =
                most_recent(candidates.iter().filter(|c| c.file_name().contains(id.as_str())))
            {
                return Some(hit);
            }
            // An opaque id rarely appears in the filename; recency is the
            // only signal left
            most_recent(candidates.iter())
        }
    }
}

fn most_recent<'a>(
    candidates: impl Iterator<Item = &'a DownloadCandidate>,
) -> Option<&'a DownloadCandidate> {
    candidates.max_by_key(|c| c.modified)
}

/// Strip a trailing extension-looking suffix and lowercase. "My Essay.docx"
/// becomes "my essay".
pub fn clean_title(title: &str) -> String {
    let trimmed = title.trim();
    let without_ext = match trimmed.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => trimmed,
    };
    without_ext.trim().to_lowercase()
}

/// All accepted spellings of a title inside a filename.
pub fn title_variants(title: &str) -> Vec<String> {
    let cleaned = clean_title(title);
    let mut variants = vec![
        cleaned.clone(),
        cleaned.replace(' ', "_"),
        cleaned.replace(' ', "-"),
        cleaned.chars().filter(|c| c.is_alphanumeric()).collect::<String>(),
    ];
    variants.retain(|v| !v.is_empty());
    variants.dedup();
    variants
}

/// Normalized-substring match: any variant of the cleaned title appearing
/// in the lowercased filename.
pub fn filename_matches_title(filename: &str, title: &str) -> bool {
    let name = filename.to_lowercase();
    title_variants(title).iter().any(|v| name.contains(v.as_str()))
}

/// Words worth matching on: longer than two characters, lowercased.
pub fn significant_words(title: &str) -> Vec<String> {
    clean_title(title)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_string())
        .collect()
}

/// Fuzzy match: at least `threshold` of the significant title words appear
/// somewhere in the filename.
pub fn filename_fuzzy_matches_title(filename: &str, title: &str, threshold: f64) -> bool {
    let words = significant_words(title);
    if words.is_empty() {
        return false;
    }
    let name = filename.to_lowercase();
    let hits = words.iter().filter(|w| name.contains(w.as_str())).count();
    (hits as f64) / (words.len() as f64) >= threshold
}

/// Copy the matched file into the artifact directory under a deterministic
/// name embedding the criterion and a timestamp. The ephemeral download
/// path is never handed out - scratch directories differ per environment
/// and get cleaned up.
pub fn finalize_artifact(
    candidate: &DownloadCandidate,
    criterion: &SearchCriterion,
    artifact_dir: &Path,
    extension: &str,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(artifact_dir)
        .with_context(|| format!("Failed to create artifact directory {:?}", artifact_dir))?;

    let timestamp = Utc::now().format("%Y%m%dT%H%M%S");
    let file_name = format!("{}_{}.{}", criterion.slug(), timestamp, extension);
    let dest = artifact_dir.join(&file_name);

    std::fs::copy(&candidate.path, &dest).with_context(|| {
        format!(
            "Failed to copy confirmed download {:?} to {:?}",
            candidate.path, dest
        )
    })?;

    // Best-effort scratch cleanup; the canonical copy is already safe
    if candidate.path.parent() != Some(artifact_dir) {
        if let Err(e) = std::fs::remove_file(&candidate.path) {
            debug!("Could not remove scratch download {:?}: {}", candidate.path, e);
        }
    }

    info!("Artifact stored at {:?}", dest);
    Ok(dest)
}

/// Every directory the engine should watch: the session scratch dir first,
/// configured extras, then the user's Downloads folder - the browser does
/// not always honor the configured download path.
pub fn candidate_dirs(session_download_dir: &Path, cfg: &DownloadConfig) -> Vec<PathBuf> {
    let mut dirs = vec![session_download_dir.to_path_buf()];
    dirs.extend(cfg.extra_candidate_dirs.iter().cloned());
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join("Downloads"));
    }
    dirs.dedup();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn candidate(name: &str, age: Duration, now: SystemTime) -> DownloadCandidate {
        DownloadCandidate {
            path: PathBuf::from(format!("/downloads/{}", name)),
            size: 1024,
            modified: now - age,
        }
    }

    #[test]
    fn test_recency_window_excludes_stale_files() {
        let now = SystemTime::now();
        let window = Duration::from_secs(300);
        assert!(is_recent(now - Duration::from_secs(60), now, window));
        assert!(!is_recent(now - Duration::from_secs(7200), now, window));
    }

    #[test]
    fn test_future_mtime_counts_as_recent() {
        let now = SystemTime::now();
        let window = Duration::from_secs(300);
        assert!(is_recent(now + Duration::from_secs(30), now, window));
    }

    #[test]
    fn test_title_match_is_normalization_invariant() {
        for name in [
            "my_essay_20250101.pdf",
            "my-essay-final.pdf",
            "myessay2.pdf",
            "My Essay (1).pdf",
        ] {
            assert!(
                filename_matches_title(name, "My Essay.docx"),
                "expected {:?} to match",
                name
            );
        }
        assert!(!filename_matches_title("other_paper.pdf", "My Essay.docx"));
    }

    #[test]
    fn test_clean_title_strips_extension_and_case() {
        assert_eq!(clean_title("My Essay.docx"), "my essay");
        assert_eq!(clean_title("No Extension Here"), "no extension here");
        // A dot mid-sentence is not an extension
        assert_eq!(clean_title("ver 2.0 of the plan"), "ver 2.0 of the plan");
    }

    #[test]
    fn test_significant_words_drops_short_words() {
        let words = significant_words("An Essay on the Sea.docx");
        assert_eq!(words, vec!["essay", "the", "sea"]);
    }

    #[test]
    fn test_fuzzy_match_honors_threshold() {
        let title = "Climate Change Impacts Essay";
        let name = "climate_impacts_essay_final.pdf";
        // 3 of 4 significant words present
        assert!(filename_fuzzy_matches_title(name, title, 0.6));
        assert!(!filename_fuzzy_matches_title(name, title, 0.9));
    }

    #[test]
    fn test_select_prefers_exact_over_fuzzy_and_recency() {
        let now = SystemTime::now();
        let candidates = vec![
            candidate("climate_essay_draft.pdf", Duration::from_secs(30), now),
            candidate("my_essay_1.pdf", Duration::from_secs(120), now),
        ];
        let criterion = SearchCriterion::title("My Essay");
        let selected = select_candidate(&candidates, &criterion, 0.6).unwrap();
        assert_eq!(selected.file_name(), "my_essay_1.pdf");
    }

    #[test]
    fn test_select_by_id_prefers_filename_hit_then_recency() {
        let now = SystemTime::now();
        let candidates = vec![
            candidate("report_111.pdf", Duration::from_secs(10), now),
            candidate("report_2696113910.pdf", Duration::from_secs(60), now),
        ];
        let criterion = SearchCriterion::id("2696113910");
        let selected = select_candidate(&candidates, &criterion, 0.6).unwrap();
        assert_eq!(selected.file_name(), "report_2696113910.pdf");

        // Without a filename hit, recency is the only signal
        let criterion = SearchCriterion::id("999");
        let selected = select_candidate(&candidates, &criterion, 0.6).unwrap();
        assert_eq!(selected.file_name(), "report_111.pdf");
    }

    #[test]
    fn test_select_returns_none_when_nothing_plausible_for_title() {
        let now = SystemTime::now();
        let candidates = vec![candidate("unrelated.pdf", Duration::from_secs(10), now)];
        let criterion = SearchCriterion::title("Quantum Entanglement Review");
        assert!(select_candidate(&candidates, &criterion, 0.6).is_none());
    }

    #[test]
    fn test_scan_candidates_filters_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"pdf").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"txt").unwrap();

        let found = scan_candidates(
            &[dir.path().to_path_buf()],
            "pdf",
            Duration::from_secs(600),
            SystemTime::now(),
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name(), "report.pdf");
    }

    #[test]
    fn test_scan_skips_missing_directories() {
        let found = scan_candidates(
            &[PathBuf::from("/definitely/not/here")],
            "pdf",
            Duration::from_secs(600),
            SystemTime::now(),
        );
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_confirm_download_moves_match_to_artifact_dir() {
        let scratch = TempDir::new().unwrap();
        let artifacts = TempDir::new().unwrap();
        std::fs::write(scratch.path().join("my_essay_report.pdf"), b"%PDF-").unwrap();

        let cfg = DownloadConfig {
            poll_attempts: 2,
            poll_interval_secs: 0,
            ..Default::default()
        };
        let criterion = SearchCriterion::title("My Essay");

        let confirmed = confirm_download(
            &[scratch.path().to_path_buf()],
            &criterion,
            &cfg,
            artifacts.path(),
        )
        .await
        .unwrap()
        .expect("expected a confirmed artifact");

        assert_eq!(confirmed.parent(), Some(artifacts.path()));
        let name = confirmed.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("my_essay_"));
        assert!(name.ends_with(".pdf"));
        assert!(confirmed.exists());
        // Scratch copy is gone once the canonical artifact exists
        assert!(!scratch.path().join("my_essay_report.pdf").exists());
    }

    #[tokio::test]
    async fn test_confirm_download_unconfirmed_returns_none() {
        let scratch = TempDir::new().unwrap();
        let artifacts = TempDir::new().unwrap();

        let cfg = DownloadConfig {
            poll_attempts: 2,
            poll_interval_secs: 0,
            ..Default::default()
        };
        let criterion = SearchCriterion::title("Ghost Paper");

        let confirmed = confirm_download(
            &[scratch.path().to_path_buf()],
            &criterion,
            &cfg,
            artifacts.path(),
        )
        .await
        .unwrap();
        assert!(confirmed.is_none());
    }
}
