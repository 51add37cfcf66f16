//! Server-rendered HTML for the login page and the dashboard.
//!
//! Markup only; every number shown comes from `AggregationResult`.

use std::fmt::Write as _;

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::aggregate::{AggregationResult, CHART_TITLE};
use crate::articles::types::ArticleRecord;
use crate::auth::Identity;
use crate::export::format_amount;
use crate::filters::ArticleFilter;

pub const APP_TITLE: &str = "NewsDash Pro";
pub const CURRENCY: &str = "₹";
pub const THEME_COOKIE: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn from_cookie(v: Option<&str>) -> Self {
        match v {
            Some("dark") => Theme::Dark,
            _ => Theme::Light,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

/// Everything the dashboard template needs, already computed.
pub struct DashboardView<'a> {
    pub identity: &'a Identity,
    pub theme: Theme,
    pub loading: bool,
    pub filter: &'a ArticleFilter,
    pub sources: &'a [String],
    pub aggregation: &'a AggregationResult,
    pub articles: &'a [&'a ArticleRecord],
}

const STYLE: &str = r#"
body{font-family:system-ui,sans-serif;margin:0;background:#f9fafb;color:#111827}
body.dark{background:#111827;color:#f9fafb}
nav{display:flex;justify-content:space-between;align-items:center;padding:12px 24px;background:#1f2937;color:#fff}
nav form{display:inline}
main{max-width:1200px;margin:0 auto;padding:24px}
.cards{display:grid;grid-template-columns:repeat(auto-fit,minmax(200px,1fr));gap:16px;margin:24px 0}
.card{background:#fff;border:1px solid #e5e7eb;border-radius:12px;padding:16px}
body.dark .card,body.dark .panel,body.dark .article{background:#1f2937;border-color:#374151}
.card .label{font-size:.85rem;color:#6b7280}.card .value{font-size:1.6rem;font-weight:700}
.panel{background:#fff;border:1px solid #e5e7eb;border-radius:12px;margin-bottom:24px;padding:16px}
table{width:100%;border-collapse:collapse}th,td{text-align:left;padding:8px;border-bottom:1px solid #e5e7eb}
.grid{display:grid;grid-template-columns:repeat(auto-fill,minmax(300px,1fr));gap:16px}
.article{border:1px solid #e5e7eb;border-radius:12px;overflow:hidden;background:#fff}
.article img,.article .noimg{width:100%;height:180px;object-fit:cover;background:#e5e7eb;display:flex;align-items:center;justify-content:center;color:#9ca3af}
.article .body{padding:12px}.meta{display:flex;justify-content:space-between;font-size:.8rem;color:#6b7280}
.filters{display:flex;flex-wrap:wrap;gap:8px}
.btn{padding:6px 12px;border-radius:8px;border:0;color:#fff;text-decoration:none;cursor:pointer}
.btn.red{background:#dc2626}.btn.green{background:#16a34a}.btn.blue{background:#2563eb}.btn.gray{background:#4b5563}
"#;

fn page(title: &str, theme: Theme, nav: &str, body: &str, extra_head: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
         <title>{}</title><style>{STYLE}</style>{extra_head}</head>\
         <body class=\"{}\">{nav}<main>{body}</main></body></html>",
        text(title),
        theme.as_str()
    )
}

fn navbar(identity: Option<&Identity>, theme: Theme) -> String {
    let mut s = String::new();
    let _ = write!(s, "<nav><strong>💰 {APP_TITLE}</strong><div>");
    let label = match theme {
        Theme::Dark => "☀ Light",
        Theme::Light => "☾ Dark",
    };
    let _ = write!(
        s,
        "<form method=\"post\" action=\"/theme\"><button class=\"btn gray\" type=\"submit\">{label}</button></form> "
    );
    if let Some(id) = identity {
        let _ = write!(
            s,
            "<span>{} ({})</span> \
             <form method=\"post\" action=\"/auth/logout\"><button class=\"btn red\" type=\"submit\">Logout</button></form>",
            text(&id.email),
            id.role.as_str()
        );
    }
    s.push_str("</div></nav>");
    s
}

/// Login page. `google_client_id` switches between Google Identity Services and a
/// plain email form (development identity mode).
pub fn login_page(theme: Theme, google_client_id: Option<&str>, error: Option<&str>) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "<h1>News Payout Dashboard</h1><p>Track articles. Earn more. Rule the news game.</p>"
    );
    if let Some(err) = error {
        let _ = write!(body, "<p style=\"color:#dc2626\">{}</p>", text(err));
    }

    let head = match google_client_id {
        Some(client_id) => {
            let _ = write!(
                body,
                "<div id=\"g_id_onload\" data-client_id=\"{}\" data-login_uri=\"/auth/login\" \
                 data-ux_mode=\"redirect\" data-auto_prompt=\"false\"></div>\
                 <div class=\"g_id_signin\" data-type=\"standard\" data-text=\"signin_with\"></div>",
                attr(client_id)
            );
            "<script src=\"https://accounts.google.com/gsi/client\" async defer></script>"
        }
        None => {
            body.push_str(
                "<form method=\"post\" action=\"/auth/login\">\
                 <input type=\"email\" name=\"credential\" placeholder=\"you@example.com\" required> \
                 <button class=\"btn blue\" type=\"submit\">🚀 Login</button></form>",
            );
            ""
        }
    };

    page(APP_TITLE, theme, &navbar(None, theme), &body, head)
}

fn card(label: &str, value: &str) -> String {
    format!(
        "<div class=\"card\"><div class=\"label\">{}</div><div class=\"value\">{}</div></div>",
        text(label),
        text(value)
    )
}

fn select(name: &str, all_label: &str, options: &[String], selected: Option<&str>) -> String {
    let mut s = format!("<select name=\"{}\"><option value=\"\">{}</option>", attr(name), text(all_label));
    for o in options {
        let sel = if selected == Some(o.as_str()) { " selected" } else { "" };
        let _ = write!(s, "<option value=\"{}\"{sel}>{}</option>", attr(o), text(o));
    }
    s.push_str("</select>");
    s
}

fn filters_form(view: &DashboardView<'_>) -> String {
    let f = view.filter;
    let authors: Vec<String> = view
        .aggregation
        .distinct_authors()
        .into_iter()
        .map(str::to_string)
        .collect();
    let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
    format!(
        "<form class=\"filters panel\" method=\"get\" action=\"/dashboard\">{}{}\
         <input type=\"text\" name=\"q\" placeholder=\"Search keyword...\" value=\"{}\">\
         <input type=\"date\" name=\"from\" value=\"{}\"><input type=\"date\" name=\"to\" value=\"{}\">\
         <button class=\"btn blue\" type=\"submit\">Apply</button></form>",
        select("author", "All Authors", &authors, f.author.as_deref()),
        select("source", "All Types", view.sources, f.source.as_deref()),
        attr(f.search.as_deref().unwrap_or("")),
        date(f.from),
        date(f.to),
    )
}

/// Pie chart data as a JS literal, safe to inline in a `<script>` block.
fn chart_data_json(agg: &AggregationResult) -> String {
    let mut rows = vec![serde_json::json!(["Author", "Articles"])];
    rows.extend(
        agg.chart_series()
            .into_iter()
            .map(|(author, n)| serde_json::json!([author, n])),
    );
    serde_json::Value::Array(rows).to_string().replace("</", "<\\/")
}

fn chart_panel(agg: &AggregationResult) -> (String, String) {
    let head = format!(
        "<script src=\"https://www.gstatic.com/charts/loader.js\"></script><script>\
         google.charts.load('current',{{packages:['corechart']}});\
         google.charts.setOnLoadCallback(function(){{\
         var data=google.visualization.arrayToDataTable({});\
         new google.visualization.PieChart(document.getElementById('chart')).draw(data,{{title:{}}});}});\
         </script>",
        chart_data_json(agg),
        serde_json::Value::String(CHART_TITLE.to_string())
    );
    let body = "<div class=\"panel\"><div id=\"chart\" style=\"width:100%;height:400px\"></div></div>".to_string();
    (head, body)
}

fn payout_panel(agg: &AggregationResult) -> String {
    let mut s = String::from(
        "<div class=\"panel\"><div style=\"display:flex;justify-content:space-between;align-items:center\">\
         <div><h2>💰 Payout Calculator</h2><p>Manage author rates and calculate payouts</p></div>\
         <div><a class=\"btn red\" href=\"/export/payouts.pdf\">Export PDF</a> \
         <a class=\"btn green\" href=\"/export/payouts.csv\">Export CSV</a></div></div>",
    );
    let _ = write!(
        s,
        "<table><thead><tr><th>Author</th><th>Articles</th><th>Rate ({CURRENCY})</th><th>Total ({CURRENCY})</th></tr></thead><tbody>"
    );
    for row in agg.payout_rows() {
        let rate_value = if row.rate > 0.0 { format_amount(row.rate) } else { String::new() };
        let _ = write!(
            s,
            "<tr><td>{}</td><td>{}</td>\
             <td><input type=\"number\" min=\"0\" step=\"0.01\" placeholder=\"0.00\" value=\"{}\" \
             data-author=\"{}\" onchange=\"saveRate(this)\"></td><td>{CURRENCY}{}</td></tr>",
            text(&row.author),
            row.articles,
            attr(&rate_value),
            attr(&row.author),
            text(&format_amount(row.total)),
        );
    }
    s.push_str(
        "</tbody></table></div>\
         <script>function saveRate(el){fetch('/api/rates/'+encodeURIComponent(el.dataset.author),\
         {method:'PUT',headers:{'content-type':'application/json'},body:JSON.stringify({rate:el.value})})\
         .then(function(){location.reload();}).catch(function(e){console.error('Failed to save rate',e);});}</script>",
    );
    s
}

/// Article links come from a third party; only `http(s)` URLs are rendered.
fn web_url(url: &str) -> Option<&str> {
    let url = url.trim();
    let scheme = url.split_once(':')?.0;
    (scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")).then_some(url)
}

fn article_card(a: &ArticleRecord) -> String {
    let image = match a.image_url.as_deref().and_then(web_url) {
        Some(src) => format!(
            "<img src=\"{}\" alt=\"{}\" onerror=\"this.style.display='none';this.nextElementSibling.style.display='flex'\">\
             <div class=\"noimg\" style=\"display:none\">No image</div>",
            attr(src),
            attr(&a.title)
        ),
        None => "<div class=\"noimg\">No image</div>".to_string(),
    };
    let published = a
        .published_at
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let source = if a.source_name.is_empty() { "N/A" } else { a.source_name.as_str() };
    format!(
        "<div class=\"article\">{image}<div class=\"body\"><h3>{}</h3><p>{}</p>\
         <div class=\"meta\"><span>{}</span><span>{}</span></div>\
         <div class=\"meta\"><span>{}</span><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">Read more</a></div>\
         </div></div>",
        text(&a.title),
        text(a.description.as_deref().unwrap_or("")),
        text(a.attributed_author().unwrap_or("Unknown")),
        text(&published),
        text(source),
        attr(web_url(&a.url).unwrap_or("#")),
    )
}

pub fn dashboard_page(view: &DashboardView<'_>) -> String {
    let nav = navbar(Some(view.identity), view.theme);
    if view.loading {
        return page(
            APP_TITLE,
            view.theme,
            &nav,
            "<p>Loading dashboard...</p><meta http-equiv=\"refresh\" content=\"2\">",
            "",
        );
    }

    let agg = view.aggregation;
    let mut body = String::from(
        "<h1>📊 Dashboard</h1><p>Monitor your content performance and manage payouts</p>",
    );
    body.push_str(&filters_form(view));

    body.push_str("<div class=\"cards\">");
    body.push_str(&card("Total Articles", &agg.total_articles.to_string()));
    body.push_str(&card("Active Authors", &agg.authors.len().to_string()));
    if view.identity.is_admin() {
        body.push_str(&card(
            "Total Payout",
            &format!("{CURRENCY}{}", format_amount(agg.total_payout)),
        ));
        body.push_str(&card("Avg. Rate", &format!("{CURRENCY}{}", agg.average_rate)));
    }
    body.push_str("</div>");

    let (chart_head, chart_body) = chart_panel(agg);
    body.push_str(&chart_body);

    if view.identity.is_admin() {
        body.push_str(&payout_panel(agg));
    }

    let _ = write!(
        body,
        "<div class=\"panel\"><h2>📰 Latest Articles</h2><p>Showing {} of {} articles</p><div class=\"grid\">",
        view.articles.len(),
        agg.total_articles
    );
    for a in view.articles {
        body.push_str(&article_card(a));
    }
    body.push_str("</div></div>");

    page(APP_TITLE, view.theme, &nav, &body, &chart_head)
}
