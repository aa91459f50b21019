//! Quote PDF export
//!
//! The quote is rendered to a self-contained HTML page (uploaded images are
//! inlined as data URIs) and printed to A4 by a headless Chromium.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::Local;
use rust_decimal::Decimal;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::services::storage::{name_from_public_url, UploadStorage};
use crate::types::{CompanyProfile, QuoteDetail};

/// Prints an HTML document to PDF bytes
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>>;
}

/// Renderer driving the Chromium binary with `--print-to-pdf`
#[derive(Debug, Clone)]
pub struct ChromiumPdfRenderer {
    binary: PathBuf,
}

impl ChromiumPdfRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl PdfRenderer for ChromiumPdfRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>> {
        let workdir = tempfile::tempdir().context("cannot create PDF work dir")?;
        let html_path = workdir.path().join("quote.html");
        let pdf_path = workdir.path().join("quote.pdf");
        tokio::fs::write(&html_path, html).await?;

        let output = Command::new(&self.binary)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", pdf_path.display()))
            .arg(format!("file://{}", html_path.display()))
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("cannot start {}", self.binary.display()))?;

        if !output.status.success() {
            bail!(
                "chromium exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let pdf = tokio::fs::read(&pdf_path)
            .await
            .context("chromium did not produce a PDF")?;
        debug!(size = pdf.len(), "Quote PDF rendered");
        Ok(pdf)
    }
}

// =============================================================================
// Images
// =============================================================================

fn mime_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "image/jpeg",
    }
}

/// Image sources for every uploaded image the quote references. Local
/// `/uploads` files become data URIs; remote URLs are left as they are.
pub async fn inline_images(
    storage: &UploadStorage,
    detail: &QuoteDetail,
    company: &CompanyProfile,
) -> HashMap<String, String> {
    let urls = detail
        .items
        .iter()
        .filter_map(|i| i.cover_url.as_deref())
        .chain(company.logo_url.as_deref());

    let mut sources = HashMap::new();
    for url in urls {
        if sources.contains_key(url) {
            continue;
        }
        let Some(name) = name_from_public_url(url) else {
            continue;
        };
        match storage.read(name).await {
            Ok(bytes) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                sources.insert(url.to_string(), format!("data:{};base64,{}", mime_for(name), encoded));
            }
            Err(e) => warn!(url, "Quote image not embedded: {:#}", e),
        }
    }
    sources
}

// =============================================================================
// HTML
// =============================================================================

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn money(value: Decimal) -> String {
    format!("¥{:.2}", value)
}

fn image_src<'a>(url: &'a str, sources: &'a HashMap<String, String>) -> &'a str {
    sources.get(url).map(String::as_str).unwrap_or(url)
}

const STYLE: &str = r#"
  @page { size: A4; margin: 20mm 15mm; }
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body { font-family: "Microsoft YaHei", "SimHei", Arial, sans-serif; font-size: 14px; line-height: 1.6; color: #333; -webkit-print-color-adjust: exact; }
  .header { display: flex; align-items: center; margin-bottom: 30px; padding-bottom: 20px; border-bottom: 2px solid #ff8a00; }
  .logo { width: 80px; height: 80px; margin-right: 20px; border-radius: 50%; object-fit: contain; }
  .company-info { flex: 1; }
  .company-info h2 { color: #ff8a00; font-size: 24px; margin-bottom: 10px; }
  .company-info p, .quote-info p { margin: 5px 0; }
  .quote-header { display: flex; justify-content: space-between; margin-bottom: 30px; }
  .quote-title { font-size: 28px; font-weight: bold; color: #ff8a00; }
  .quote-info { text-align: right; }
  table { width: 100%; border-collapse: collapse; margin-bottom: 20px; }
  th, td { padding: 8px; text-align: left; border-bottom: 1px solid #ddd; }
  th { background-color: #ff8a00; color: white; font-weight: bold; }
  tbody tr:nth-child(odd) { background-color: #fafafa; }
  .cell-small { font-size: 12px; }
  .text-right { text-align: right; }
  .product-thumb { width: 56px; height: 40px; object-fit: cover; border: 1px solid #eee; border-radius: 4px; }
  .desc { color: #555; }
  .summary { display: flex; justify-content: flex-end; margin-top: 30px; }
  .summary-table { width: 400px; }
  .summary-table td:last-child { text-align: right; font-weight: bold; }
  .total-row td { background-color: #ffe0b2; font-size: 16px; }
  .footer { margin-top: 50px; padding-top: 20px; border-top: 1px solid #ddd; text-align: center; color: #999; font-size: 12px; }
"#;

/// Full HTML document for a quote
pub fn render_quote_html(
    detail: &QuoteDetail,
    company: &CompanyProfile,
    sources: &HashMap<String, String>,
) -> String {
    let quote = &detail.quote;
    let mut html = String::with_capacity(8 * 1024);

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n",
        escape_html(&quote.code),
        STYLE
    );

    // Letterhead
    html.push_str("<div class=\"header\">\n");
    match company.logo_url.as_deref() {
        Some(url) if !url.is_empty() => {
            let _ = writeln!(
                html,
                "<img src=\"{}\" alt=\"Logo\" class=\"logo\">",
                escape_html(image_src(url, sources))
            );
        }
        _ => html.push_str("<div class=\"logo\"></div>\n"),
    }
    let _ = writeln!(
        html,
        "<div class=\"company-info\"><h2>{}</h2><p>{}</p><p>开户行：{}</p><p>账号：{}</p><p>电话：{}</p></div>\n</div>",
        escape_html(&company.name_cn),
        escape_html(&company.name_en),
        escape_html(&company.bank_name),
        escape_html(&company.bank_account),
        escape_html(&company.phone),
    );

    // Quote info
    html.push_str("<div class=\"quote-header\">\n<div class=\"quote-title\">报价单</div>\n<div class=\"quote-info\">\n");
    let _ = writeln!(html, "<p>编号：{}</p>", escape_html(&quote.code));
    let _ = writeln!(html, "<p>客户：{}</p>", escape_html(&quote.customer_name));
    if let Some(phone) = quote.customer_phone.as_deref().filter(|v| !v.is_empty()) {
        let _ = writeln!(html, "<p>电话：{}</p>", escape_html(phone));
    }
    if let Some(address) = quote.customer_address.as_deref().filter(|v| !v.is_empty()) {
        let _ = writeln!(html, "<p>地址：{}</p>", escape_html(address));
    }
    let _ = writeln!(
        html,
        "<p>日期：{}</p>",
        quote.created_at.with_timezone(&Local).format("%Y/%-m/%-d")
    );
    if let Some(note) = quote.note.as_deref().filter(|v| !v.is_empty()) {
        let _ = writeln!(html, "<p>备注：{}</p>", escape_html(note));
    }
    html.push_str("</div>\n</div>\n");

    // Items
    html.push_str(
        "<table>\n<thead><tr><th>序号</th><th>图片</th><th>产品名称</th><th>规格</th><th>产品介绍</th>\
         <th>数量</th><th>单价</th><th>小计</th><th>预定天数</th></tr></thead>\n<tbody>\n",
    );
    for (index, line) in detail.items.iter().enumerate() {
        let image = match line.cover_url.as_deref() {
            Some(url) if !url.is_empty() => format!(
                "<img class=\"product-thumb\" src=\"{}\" alt=\"{}\">",
                escape_html(image_src(url, sources)),
                escape_html(&line.product_name)
            ),
            _ => String::new(),
        };
        let amount = line.item.display_price * Decimal::from(line.item.quantity);
        let _ = writeln!(
            html,
            "<tr><td class=\"cell-small\">{}</td><td>{}</td><td>{}</td><td class=\"cell-small\">{}</td>\
             <td class=\"cell-small desc\">{}</td><td class=\"cell-small\">{}</td>\
             <td class=\"cell-small text-right\">{}</td><td class=\"cell-small text-right\">{}</td>\
             <td class=\"cell-small\">{} 天</td></tr>",
            index + 1,
            image,
            escape_html(&line.product_name),
            escape_html(&line.product_spec),
            escape_html(line.product_description.as_deref().unwrap_or_default()),
            line.item.quantity,
            money(line.item.display_price),
            money(amount),
            line.lead_days,
        );
    }
    html.push_str("</tbody>\n</table>\n");

    // Summary
    let totals = &detail.totals;
    html.push_str("<div class=\"summary\">\n<table class=\"summary-table\">\n");
    let _ = writeln!(html, "<tr><td>小计</td><td>{}</td></tr>", money(totals.subtotal));
    if quote.tax_rate > Decimal::ZERO {
        let _ = writeln!(
            html,
            "<tr><td>税费 ({:.2}%)</td><td>{}</td></tr>",
            quote.tax_rate * Decimal::ONE_HUNDRED,
            money(totals.tax)
        );
    }
    let _ = writeln!(
        html,
        "<tr class=\"total-row\"><td>总计</td><td>{}</td></tr>",
        money(totals.total)
    );
    html.push_str("</table>\n</div>\n");

    html.push_str("<div class=\"footer\"><p>本报价单由系统自动生成</p></div>\n</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use chrono::Utc;
    use uuid::Uuid;

    use crate::services::pricing::quote_totals;
    use crate::types::{Quote, QuoteItem, QuoteItemView, QuoteStatus};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn company(logo_url: Option<&str>) -> CompanyProfile {
        CompanyProfile {
            name_cn: "海鲜贸易有限公司".to_string(),
            name_en: "Seafood Trading Co.".to_string(),
            logo_url: logo_url.map(str::to_string),
            bank_account: "6222 0000 1111".to_string(),
            bank_name: "招商银行".to_string(),
            phone: "021-12345678".to_string(),
            updated_at: Utc::now(),
        }
    }

    fn line(name: &str, price: &str, quantity: i32, cover_url: Option<&str>) -> QuoteItemView {
        QuoteItemView {
            item: QuoteItem {
                id: Uuid::new_v4(),
                quote_id: Uuid::nil(),
                product_id: Uuid::new_v4(),
                quantity,
                base_price: dec(price),
                row_delta: Decimal::ZERO,
                row_amount: Decimal::ZERO,
                display_price: dec(price),
                created_at: Utc::now(),
            },
            product_name: name.to_string(),
            product_spec: "5kg/箱".to_string(),
            product_description: Some("冷冻 <新鲜>".to_string()),
            lead_days: 3,
            cover_url: cover_url.map(str::to_string),
        }
    }

    fn detail(tax_rate: &str, items: Vec<QuoteItemView>) -> QuoteDetail {
        let totals = quote_totals(
            items.iter().map(|i| (i.item.display_price, i.item.quantity)),
            dec(tax_rate),
        );
        QuoteDetail {
            quote: Quote {
                id: Uuid::nil(),
                code: "QT202503070001".to_string(),
                creator_id: None,
                customer_name: "张三 & 李四".to_string(),
                customer_phone: Some("13800000000".to_string()),
                customer_address: None,
                currency: "CNY".to_string(),
                tax_rate: dec(tax_rate),
                status: QuoteStatus::Draft,
                note: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            items,
            totals,
        }
    }

    #[test]
    fn test_html_contains_letterhead_items_and_totals() {
        let detail = detail("0.06", vec![line("带鱼", "50", 2, None), line("黄鱼", "70", 2, None)]);
        let html = render_quote_html(&detail, &company(None), &HashMap::new());

        assert!(html.contains("海鲜贸易有限公司"));
        assert!(html.contains("开户行：招商银行"));
        assert!(html.contains("编号：QT202503070001"));
        assert!(html.contains("客户：张三 &amp; 李四"));
        assert!(html.contains("<td>带鱼</td>"));
        assert!(html.contains("冷冻 &lt;新鲜&gt;"));
        assert!(html.contains("¥240.00"));
        assert!(html.contains("税费 (6.00%)"));
        assert!(html.contains("¥14.40"));
        assert!(html.contains("¥254.40"));
        assert!(!html.contains("地址："));
    }

    #[test]
    fn test_tax_row_omitted_without_tax() {
        let detail = detail("0", vec![line("带鱼", "50", 1, None)]);
        let html = render_quote_html(&detail, &company(None), &HashMap::new());
        assert!(!html.contains("税费"));
        assert!(html.contains("<div class=\"logo\"></div>"));
    }

    #[tokio::test]
    async fn test_uploaded_images_are_inlined() {
        let dir = tempfile::tempdir().unwrap();
        let storage = UploadStorage::new(dir.path());
        storage.write("logo.png", b"\x89PNG").await.unwrap();

        let remote = "https://placehold.co/400x300?text=Product";
        let detail = detail("0", vec![line("带鱼", "50", 1, Some(remote))]);
        let company = company(Some("/uploads/logo.png"));

        let sources = inline_images(&storage, &detail, &company).await;
        assert_eq!(sources.len(), 1);
        assert!(sources["/uploads/logo.png"].starts_with("data:image/png;base64,"));

        let html = render_quote_html(&detail, &company, &sources);
        assert!(html.contains("src=\"data:image/png;base64,"));
        assert!(html.contains("https://placehold.co/400x300?text=Product"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">'&'</a>"), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
