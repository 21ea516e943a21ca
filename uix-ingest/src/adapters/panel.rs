//! The fixed panel of fourteen survey sources

use std::sync::Arc;
use std::time::Duration;

use super::atlanta_fed::{AtlantaFedSbuAdapter, SbuSeries, SBU_WORKBOOK_URL};
use super::cfo_survey::{CfoMeasure, CfoSurveyAdapter, CFO_WORKBOOK_URL};
use super::fred::{FredClient, FredMode, FredSeriesAdapter};
use super::scrape::{PageFetcher, ScrapeAdapter};
use super::workbook::WorkbookFetcher;
use super::{AdapterError, Frequency, SurveyAdapter};

const NUMBER: &str = r"([0-9]+(?:\.[0-9]+)?)";

const CONFERENCE_BOARD_URL: &str = "https://www.conference-board.org/topics/consumer-confidence/";
const NY_FED_SCE_URL: &str = "https://www.newyorkfed.org/microeconomics/sce";
const NFIB_URL: &str = "https://www.nfib.com/news/monthly_report/sbet/";
const BRT_URL: &str = "https://www.businessroundtable.org/media/ceo-economic-outlook-index";
const EY_URL: &str = "https://www.ey.com/en_gl/ceo/ceo-outlook-global-report";
const DELOITTE_URL: &str =
    "https://www.deloitte.com/us/en/insights/topics/leadership/cfo-survey-data-dashboard.html";

/// Everything needed to build the panel
#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub fred_api_key: Option<String>,
    pub fred_base_url: Option<String>,
    pub page_cache_ttl: Duration,
    pub workbook_cache_ttl: Duration,
    pub cfo_workbook_url: String,
    pub sbu_workbook_url: String,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            fred_api_key: None,
            fred_base_url: None,
            page_cache_ttl: Duration::from_secs(15 * 60),
            workbook_cache_ttl: Duration::from_secs(60 * 60),
            cfo_workbook_url: CFO_WORKBOOK_URL.to_string(),
            sbu_workbook_url: SBU_WORKBOOK_URL.to_string(),
        }
    }
}

/// Build all fourteen adapters in ledger column order
///
/// Adapters reading the same origin share one fetcher and therefore one cache.
pub fn default_panel(
    config: &PanelConfig,
    http: reqwest::Client,
) -> Result<Vec<Arc<dyn SurveyAdapter>>, AdapterError> {
    let fred = Arc::new(FredClient::new(
        http.clone(),
        config.fred_base_url.clone(),
        config.fred_api_key.clone(),
    ));
    let pages = Arc::new(PageFetcher::new(http.clone(), config.page_cache_ttl));
    let workbooks = Arc::new(WorkbookFetcher::new(http, config.workbook_cache_ttl));

    let scrape = |name: &str, source_url: &str, page_url: &str, frequency: Frequency, patterns: &[String]| {
        let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
        ScrapeAdapter::new(name, source_url, page_url, frequency, &patterns, Arc::clone(&pages))
            .map(|a| Arc::new(a) as Arc<dyn SurveyAdapter>)
    };
    let to = |prefix: &str| format!(r"{}[^.]*?to\s+{}", prefix, NUMBER);

    let panel: Vec<Arc<dyn SurveyAdapter>> = vec![
        Arc::new(FredSeriesAdapter::new(
            "University of Michigan Consumer Sentiment",
            "UMCSENT",
            Frequency::Monthly,
            FredMode::LatestAsOfMonthEnd,
            Arc::clone(&fred),
        )),
        scrape(
            "Conference Board Consumer Confidence",
            CONFERENCE_BOARD_URL,
            CONFERENCE_BOARD_URL,
            Frequency::Monthly,
            &[
                to("Consumer Confidence Index"),
                format!(r"Consumer Confidence Index[^.]*?reached\s+{}", NUMBER),
            ],
        )?,
        scrape(
            "NY Fed Consumer Expectations - inflation",
            "https://www.newyorkfed.org/microeconomics/sce#/",
            NY_FED_SCE_URL,
            Frequency::Monthly,
            &[
                format!(r"Median inflation expectations[^.]*?to\s+{}\s*percent[^.]*one-year-ahead", NUMBER),
                format!(r"Median inflation expectations[^.]*?to\s+{}\s*percent[^.]*one year", NUMBER),
                format!(r"Median inflation expectations[^.]*?one-year-ahead[^.]*?to\s+{}\s*percent", NUMBER),
            ],
        )?,
        Arc::new(CfoSurveyAdapter::new(
            "Duke/Fed CFO Survey Optimism - Economy",
            CfoMeasure::Economy,
            &config.cfo_workbook_url,
            Arc::clone(&workbooks),
        )),
        scrape(
            "NFIB Small Business Optimism",
            NFIB_URL,
            NFIB_URL,
            Frequency::Monthly,
            &[to("Small Business Optimism Index"), to("Optimism Index")],
        )?,
        scrape(
            "Business Roundtable CEO Outlook",
            BRT_URL,
            BRT_URL,
            Frequency::Quarterly,
            &[to("overall Index"), to("Index posted")],
        )?,
        Arc::new(CfoSurveyAdapter::new(
            "Duke/Fed CFO Survey Optimism - Own Firm",
            CfoMeasure::OwnFirm,
            &config.cfo_workbook_url,
            Arc::clone(&workbooks),
        )),
        scrape(
            "EY-Parthenon CEO Confidence",
            "https://www.ey.com/en_us/ceo/ceo-outlook-global-report",
            EY_URL,
            Frequency::Quarterly,
            &[
                format!(r"Overall sentiment declined from\s+{}\s+to\s+{}", r"[0-9]+(?:\.[0-9]+)?", NUMBER),
                format!(r"Overall sentiment rose from\s+{}\s+to\s+{}", r"[0-9]+(?:\.[0-9]+)?", NUMBER),
            ],
        )?,
        scrape(
            "Deloitte CFO Confidence",
            DELOITTE_URL,
            DELOITTE_URL,
            Frequency::Quarterly,
            &[
                r"CFO confidence continues to rise[^0-9]*([0-9]+\.[0-9]+)".to_string(),
                r"CFO confidence[^0-9]*([0-9]+\.[0-9]+)".to_string(),
                r"The\s+([0-9]+\.[0-9]+)\s+reading marks".to_string(),
            ],
        )?,
        Arc::new(FredSeriesAdapter::new(
            "Economic Policy Uncertainty Index (month average)",
            "USEPUINDXD",
            Frequency::Daily,
            FredMode::MonthAverage,
            Arc::clone(&fred),
        )),
        scrape(
            "NFIB Uncertainty Index",
            NFIB_URL,
            NFIB_URL,
            Frequency::Monthly,
            &[to("Uncertainty Index"), format!(r"Uncertainty Index[^.]*?from[^.]*?to\s+{}", NUMBER)],
        )?,
        Arc::new(AtlantaFedSbuAdapter::new(
            "Atlanta Fed SBU Empgrowth Uncert",
            SbuSeries::EmploymentGrowth,
            &config.sbu_workbook_url,
            Arc::clone(&workbooks),
        )),
        Arc::new(AtlantaFedSbuAdapter::new(
            "Atlanta Fed SBU RevGrowth Uncert",
            SbuSeries::RevenueGrowth,
            &config.sbu_workbook_url,
            Arc::clone(&workbooks),
        )),
        Arc::new(FredSeriesAdapter::new(
            "OECD Composite Consumer Confidence for United States",
            "USACSCICP02STSAM",
            Frequency::Monthly,
            FredMode::LatestAsOfMonthEnd,
            fred,
        )),
    ];

    Ok(panel)
}
