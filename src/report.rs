//! Sales report over paid orders.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use thiserror::Error;

use crate::repository::{BookSales, CustomerSpend, Repository, RepositoryError, SalesTotals, SalesWindow};

pub const TOP_BOOKS: u32 = 10;
pub const TOP_CUSTOMERS: u32 = 5;
const RULE: &str = "==============================================";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Could not write report to {path}: {source}")]
    Write { path: PathBuf, #[source] source: std::io::Error },
}

/// Inclusive range of calendar days.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportWindow {
    pub label: String,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl ReportWindow {
    /// The calendar month before the one containing `today`.
    pub fn previous_month(today: NaiveDate) -> Self {
        let first_of_this_month = today.with_day(1).unwrap_or(today);
        let last_day = first_of_this_month.pred_opt().unwrap_or(first_of_this_month);
        let first_day = last_day.with_day(1).unwrap_or(last_day);
        Self { label: "Previous full month".to_string(), first_day, last_day }
    }

    /// The `days` days ending with `today`.
    pub fn last_days(today: NaiveDate, days: u32) -> Self {
        let first_day = today - Duration::days(i64::from(days.max(1)) - 1);
        Self { label: format!("Last {days} days"), first_day, last_day: today }
    }

    pub fn sales_window(&self) -> SalesWindow {
        SalesWindow {
            start: self.first_day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
            end: (self.last_day + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PeriodStats {
    pub window: ReportWindow,
    pub top_books: Vec<BookSales>,
    pub totals: SalesTotals,
}

impl PeriodStats {
    pub async fn load(repo: &dyn Repository, window: ReportWindow, limit: u32) -> Result<Self, RepositoryError> {
        let range = window.sales_window();
        let top_books = repo.top_selling_books(&range, limit).await?;
        let totals = repo.sales_totals(&range).await?;
        Ok(Self { window, top_books, totals })
    }

    /// The best seller and its own revenue in the window.
    pub fn champion(&self) -> Option<&BookSales> {
        self.top_books.first()
    }

    fn lines(&self) -> Vec<String> {
        let label = &self.window.label;
        let mut lines = vec![
            format!("\n--- {label} sales ({} to {}) ---", self.window.first_day, self.window.last_day),
            format!("\n1. {label} best sellers (top {TOP_BOOKS} by quantity):"),
        ];
        if self.top_books.is_empty() {
            lines.push("  No books sold in this period.".to_string());
        }
        lines.extend(self.top_books.iter().enumerate().map(|(rank, book)| {
            format!("  {}. {} (ISBN: {}) - sold: {}", rank + 1, book.title, book.isbn, book.quantity)
        }));

        lines.push(format!("\n2. {label} overall:"));
        lines.push(format!("  Revenue: {}", self.totals.revenue));
        lines.push(format!("  Units sold: {}", self.totals.quantity));
        lines.push(match self.champion() {
            Some(top) => format!("  Best seller: {}, sold: {}, revenue: {}", top.title, top.quantity, top.revenue),
            None => "  Best seller: no sales".to_string(),
        });
        lines
    }
}

#[derive(Clone, Debug)]
pub struct SalesReport {
    pub generated_at: DateTime<Utc>,
    pub previous_month: PeriodStats,
    pub last_week: PeriodStats,
    pub top_customers: Vec<CustomerSpend>,
}

impl SalesReport {
    pub async fn build(repo: &dyn Repository, now: DateTime<Utc>) -> Result<Self, RepositoryError> {
        let today = now.date_naive();
        Ok(Self {
            generated_at: now,
            previous_month: PeriodStats::load(repo, ReportWindow::previous_month(today), TOP_BOOKS).await?,
            last_week: PeriodStats::load(repo, ReportWindow::last_days(today, 7), TOP_BOOKS).await?,
            top_customers: repo.top_customers(TOP_CUSTOMERS).await?,
        })
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            "Sales report".to_string(),
            format!("Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
            RULE.to_string(),
        ];
        lines.extend(self.previous_month.lines());
        lines.extend(self.last_week.lines());

        lines.push(format!("\n\n=== Top customers by lifetime spend (top {TOP_CUSTOMERS}) ==="));
        if self.top_customers.is_empty() {
            lines.push("  No customer spending yet (or only guest orders).".to_string());
        }
        lines.extend(self.top_customers.iter().enumerate().map(|(rank, c)| {
            format!("  {}. {} (username: {}) - total spent: {}", rank + 1, c.name, c.username, c.total_spent)
        }));

        lines.push(format!("\n{RULE}"));
        lines.push("End of report\n".to_string());
        lines.join("\n")
    }

    pub fn file_name(&self, prefix: &str) -> String {
        format!("{prefix}_{}.txt", self.generated_at.format("%Y%m%d_%H%M%S"))
    }

    /// Writes the rendered report into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path, prefix: &str) -> Result<PathBuf, ReportError> {
        let path = dir.join(self.file_name(prefix));
        let write_err = |source| ReportError::Write { path: path.clone(), source };
        std::fs::create_dir_all(dir).map_err(write_err)?;
        std::fs::write(&path, self.render()).map_err(write_err)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::domain::value_objects::Money;
    use crate::services::testing::{fixture, isbn};
    use crate::services::{CartIdentity, CheckoutForm};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_previous_month_window() {
        let w = ReportWindow::previous_month(day(2024, 3, 15));
        assert_eq!((w.first_day, w.last_day), (day(2024, 2, 1), day(2024, 2, 29)));

        let w = ReportWindow::previous_month(day(2024, 1, 1));
        assert_eq!((w.first_day, w.last_day), (day(2023, 12, 1), day(2023, 12, 31)));
    }

    #[test]
    fn test_last_days_window_includes_today() {
        let w = ReportWindow::last_days(day(2024, 3, 7), 7);
        assert_eq!((w.first_day, w.last_day), (day(2024, 3, 1), day(2024, 3, 7)));

        let range = w.sales_window();
        assert!(range.contains(day(2024, 3, 7).and_hms_opt(23, 59, 59).unwrap().and_utc()));
        assert!(!range.contains(day(2024, 3, 8).and_hms_opt(0, 0, 0).unwrap().and_utc()));
    }

    #[tokio::test]
    async fn test_report_counts_paid_orders_only() {
        let f = fixture(Settings::default());
        f.book("111", "Alpha", 1000, 50).await;
        f.book("222", "Beta", 500, 50).await;
        let ann = f.customer("ann", false).await;

        let me = CartIdentity::customer("s1", ann.id);
        f.store.add_to_cart(&me, &isbn("111"), 2).await.unwrap();
        f.store.add_to_cart(&me, &isbn("222"), 3).await.unwrap();
        f.store.checkout(&me, CheckoutForm::new("Ann", "555").paid()).await.unwrap();

        let guest = CartIdentity::anonymous("s2");
        f.store.add_to_cart(&guest, &isbn("111"), 9).await.unwrap();
        f.store.checkout(&guest, CheckoutForm::new("Bo", "1")).await.unwrap();

        let report = SalesReport::build(f.store.repository().as_ref(), Utc::now()).await.unwrap();
        let week = &report.last_week;
        assert_eq!(week.totals.quantity, 5);
        assert_eq!(week.totals.revenue, Money::from_cents(3500));
        let top = week.champion().unwrap();
        assert_eq!((top.title.as_str(), top.quantity, top.revenue), ("Beta", 3, Money::from_cents(1500)));

        assert_eq!(report.top_customers.len(), 1);
        assert_eq!(report.top_customers[0].total_spent, Money::from_cents(3500));

        let text = report.render();
        assert!(text.starts_with("Sales report\n"));
        assert!(text.contains("1. Beta (ISBN: 222) - sold: 3"));
        assert!(text.contains("1. ANN (username: ann) - total spent: ¥35.00"));
        assert!(text.trim_end().ends_with("End of report"));
    }

    #[tokio::test]
    async fn test_write_report_file() {
        let f = fixture(Settings::default());
        let now = day(2024, 5, 2).and_hms_opt(8, 30, 0).unwrap().and_utc();
        let report = SalesReport::build(f.store.repository().as_ref(), now).await.unwrap();
        let text = report.render();
        assert!(text.contains("No books sold in this period."));
        assert_eq!(text.matches("  Best seller: no sales\n").count(), 2);
        assert!(text.contains("(top 5) ===\n  No customer spending yet"));
        assert!(text.ends_with(&format!("\n\n{RULE}\nEnd of report\n")));

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let path = report.write_to(&out, "sales_report").unwrap();
        assert_eq!(path, out.join("sales_report_20240502_083000.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), report.render());
    }
}
