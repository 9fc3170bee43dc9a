use fetchlock_lock::{LocalCheck, LocalStatus, Resource};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "URL")]
    url:       String,
    #[tabled(rename = "INTEGRITY")]
    integrity: String,
    #[tabled(rename = "TAGS")]
    tags:      String,
    #[tabled(rename = "FILE")]
    file:      String,
}

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "FILE")]
    file:   String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "URL")]
    url:    String,
}

fn render(data: impl IntoIterator<Item = impl Tabled>) -> String {
    let mut table = Table::new(data);
    table.with(Style::blank());
    table.to_string()
}

pub fn resources(resources: &[Resource]) -> String {
    render(resources.iter().map(|r| ResourceRow {
        url:       r.urls.join("\n"),
        integrity: r.integrity.to_string(),
        tags:      r.tags.join(","),
        file:      r.local_name().unwrap_or_else(|_| "-".to_string()),
    }))
}

pub fn checks(checks: &[LocalCheck]) -> String {
    render(checks.iter().map(|check| CheckRow {
        file:   check.path.display().to_string(),
        status: match &check.status {
            LocalStatus::Verified => "ok".to_string(),
            LocalStatus::Missing => "missing".to_string(),
            LocalStatus::Corrupt { actual } => format!("corrupt ({actual})"),
        },
        url:    check.url.clone(),
    }))
}
