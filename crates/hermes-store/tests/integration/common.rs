use hermes_core::job::{JobConfig, JobRecord, JobStatus};
use hermes_core::models::ExtractedItem;

pub fn job_config(site: &str, term: &str) -> JobConfig {
    JobConfig {
        site: site.to_string(),
        search_term: term.to_string(),
        max_pages: 2,
        delay_secs: 1.0,
    }
}

/// A record in `status` carrying `items` synthetic items.
pub fn record(status: JobStatus, items: usize) -> JobRecord {
    let mut record = JobRecord::new(job_config("mercado_livre", "notebook"));
    record.status = status;
    record.items = (1..=items)
        .map(|i| ExtractedItem {
            name: format!("Notebook {i}"),
            raw_price: Some(format!("R$ {i}.999,00")),
            normalized_price: Some(i as f64 * 1000.0 + 999.0),
            link: Some(format!("https://www.mercadolivre.com.br/p/{i}")),
            site: "Mercado Livre".to_string(),
            page: 1,
        })
        .collect();
    if status.is_terminal() {
        record.completed_at = Some(chrono::Utc::now());
    }
    record
}
