//! Plain-text and HTML rendering of a recommendation set.

use crate::delivery::Notification;
use crate::domain::recommendation::{Bucket, Recommendation, RecommendationSet};
use crate::time::tw_market::taipei_offset;
use chrono::{DateTime, NaiveDate, Utc};
use html_escape::encode_text;
use std::fmt::Write;

const EMPTY_SECTION: &str = "本時段無符合條件的股票";
const EMPTY_REPORT: &str = "本時段沒有符合條件的推薦股票，請留意盤勢變化。";
const DISCLAIMER: &str = "以上內容僅供參考，不構成投資建議。";

pub fn subject(set: &RecommendationSet, date: NaiveDate) -> String {
    format!(
        "【{}分析報告】- {}",
        set.time_slot.label(),
        date.format("%Y/%m/%d")
    )
}

pub fn render(set: &RecommendationSet, date: NaiveDate) -> Notification {
    Notification::text(subject(set, date), render_text(set, date)).with_html(render_html(set, date))
}

/// Urgent alert for a worker command that failed. `error` is the rendered error chain.
pub fn failure_alert(command: &str, error: &str, at: DateTime<Utc>) -> Notification {
    let when = match taipei_offset() {
        Ok(tz) => at.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    };
    let text = format!("⚠️ 股票分析系統執行失敗\n\n指令: {command}\n時間: {when}\n錯誤: {error}\n\n請檢查系統日誌。");
    let html = format!(
        "<h2>⚠️ 股票分析系統執行失敗</h2>\n<p>指令: {}<br>時間: {when}</p>\n<pre>{}</pre>\n<p>請檢查系統日誌。</p>\n",
        encode_text(command),
        encode_text(error)
    );
    Notification::text(format!("【系統警報】{command} 執行失敗"), text)
        .with_html(html)
        .urgent(true)
}

fn icon(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::ShortTerm => "📈",
        Bucket::LongTerm => "📊",
        Bucket::WeakStocks => "⚠️",
    }
}

fn price_line(rec: &Recommendation) -> String {
    match rec.target_price {
        Some(target) => format!("目標價 {target:.2} / 停損 {:.2}", rec.stop_loss),
        None => format!("出場參考 {:.2}", rec.stop_loss),
    }
}

pub fn render_text(set: &RecommendationSet, date: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\n", subject(set, date));

    if set.is_empty() {
        let _ = writeln!(out, "{EMPTY_REPORT}\n");
        let _ = write!(out, "{DISCLAIMER}");
        return out;
    }

    for bucket in Bucket::ALL {
        let _ = writeln!(out, "{} {}", icon(bucket), bucket.title());
        let recs = set.bucket(bucket);
        if recs.is_empty() {
            let _ = writeln!(out, "  {EMPTY_SECTION}");
        }
        for (i, rec) in recs.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {} {}  現價 {:.2}",
                i + 1,
                rec.code,
                rec.name,
                rec.current_price
            );
            let _ = writeln!(out, "   評級 {}  綜合分數 {:.2}", rec.grade, rec.weighted_total);
            let _ = writeln!(out, "   理由: {}", rec.reason);
            let _ = writeln!(out, "   {}", price_line(rec));
        }
        out.push('\n');
    }

    let _ = write!(out, "{DISCLAIMER}");
    out
}

pub fn render_html(set: &RecommendationSet, date: NaiveDate) -> String {
    let mut out = String::new();
    out.push_str("<html><body style=\"font-family: sans-serif;\">\n");
    let _ = writeln!(out, "<h2>{}</h2>", encode_text(&subject(set, date)));

    if set.is_empty() {
        let _ = writeln!(out, "<p>{EMPTY_REPORT}</p>");
    } else {
        for bucket in Bucket::ALL {
            let _ = writeln!(out, "<h3>{} {}</h3>", icon(bucket), bucket.title());
            let recs = set.bucket(bucket);
            if recs.is_empty() {
                let _ = writeln!(out, "<p>{EMPTY_SECTION}</p>");
                continue;
            }

            out.push_str("<table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">\n");
            out.push_str(
                "<tr><th>代號</th><th>名稱</th><th>現價</th><th>評級</th><th>理由</th><th>價位</th></tr>\n",
            );
            for rec in recs {
                let _ = writeln!(
                    out,
                    "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    encode_text(&rec.code),
                    encode_text(&rec.name),
                    rec.current_price,
                    rec.grade,
                    encode_text(&rec.reason),
                    price_line(rec)
                );
            }
            out.push_str("</table>\n");
        }
    }

    let _ = writeln!(out, "<p><small>{DISCLAIMER}</small></p>");
    out.push_str("</body></html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Grade;
    use crate::time::TimeSlot;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn rec(code: &str, name: &str, bucket: Bucket, target: Option<f64>) -> Recommendation {
        Recommendation {
            code: code.into(),
            name: name.into(),
            current_price: 100.0,
            bucket,
            grade: Grade::A,
            weighted_total: 7.25,
            reason: "MACD 黃金交叉".into(),
            target_price: target,
            stop_loss: 95.0,
            trade_value: 1.0e9,
        }
    }

    #[test]
    fn subject_uses_slot_label_and_date() {
        let set = RecommendationSet::empty(TimeSlot::MorningScan);
        assert_eq!(subject(&set, date()), "【早盤掃描分析報告】- 2026/03/02");
    }

    #[test]
    fn empty_set_still_renders_a_report() {
        let note = render(&RecommendationSet::empty(TimeSlot::AfternoonScan), date());
        assert!(note.body_text.contains(EMPTY_REPORT));
        assert!(note.body_html.unwrap().contains(EMPTY_REPORT));
        assert!(!note.urgent);
    }

    #[test]
    fn sections_list_recommendations_and_empty_buckets() {
        let mut set = RecommendationSet::empty(TimeSlot::MidDayScan);
        set.short_term.push(rec("2330", "台積電", Bucket::ShortTerm, Some(108.0)));
        set.weak_stocks.push(rec("2603", "長榮", Bucket::WeakStocks, None));

        let text = render_text(&set, date());
        assert!(text.contains("📈 短線推薦\n1. 2330 台積電  現價 100.00"));
        assert!(text.contains("目標價 108.00 / 停損 95.00"));
        assert!(text.contains("📊 長線潛力\n  本時段無符合條件的股票"));
        assert!(text.contains("出場參考 95.00"));
    }

    #[test]
    fn html_escapes_user_strings() {
        let mut set = RecommendationSet::empty(TimeSlot::MidDayScan);
        set.long_term.push(rec("9999", "<script>x</script>", Bucket::LongTerm, Some(1.0)));
        let html = render_html(&set, date());
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn failure_alert_is_urgent_and_escaped() {
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 2, 1, 30, 0).unwrap();
        let note = failure_alert("run", "feed <down>: timeout", at);
        assert!(note.urgent);
        assert_eq!(note.subject, "【系統警報】run 執行失敗");
        assert!(note.body_text.contains("時間: 2026-03-02 09:30:00"));
        assert!(note.body_text.contains("錯誤: feed <down>: timeout"));
        let html = note.body_html.unwrap();
        assert!(html.contains("feed &lt;down&gt;: timeout"));
    }
}
