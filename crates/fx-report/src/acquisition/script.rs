//! The fixed page walk that exports one instrument's rates as XML.

use crate::instrument::Instrument;
use crate::renderer::Locator;
use crate::window::DateWindow;
use serde::Serialize;
use std::time::Duration;

/// Every interaction of the walk, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StepKind {
    DismissConsent,
    OpenMenu,
    OpenMarketSection,
    AcceptTerms,
    OpenRatesListing,
    OpenInstrumentSelector,
    SelectInstrument,
    FillStartDate,
    FillEndDate,
    SubmitQuery,
    ExportXml,
}

/// How a failed step affects its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Criticality {
    /// Dialogs that may legitimately not appear.
    Advisory,
    /// Without this step the export cannot happen.
    Required,
}

/// Which passes run a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepScope {
    /// Only the first pass; later passes start on the rates listing.
    FirstPassOnly,
    EveryPass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    Click(Locator),
    Fill { locator: Locator, text: String },
}

impl StepAction {
    pub fn locator(&self) -> &Locator {
        match self {
            StepAction::Click(locator) | StepAction::Fill { locator, .. } => locator,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub description: String,
    pub action: StepAction,
    pub criticality: Criticality,
    pub scope: StepScope,
    /// Pause after the step so the page can react, before scaling.
    pub settle: Duration,
}

impl Step {
    fn required(kind: StepKind, description: &str, action: StepAction) -> Self {
        Self {
            kind,
            description: description.to_string(),
            action,
            criticality: Criticality::Required,
            scope: StepScope::EveryPass,
            settle: Duration::from_secs(1),
        }
    }

    fn click(kind: StepKind, description: &str, locator: Locator) -> Self {
        Self::required(kind, description, StepAction::Click(locator))
    }

    fn fill(kind: StepKind, description: &str, locator: Locator, text: String) -> Self {
        Self::required(kind, description, StepAction::Fill { locator, text })
    }

    fn advisory(mut self) -> Self {
        self.criticality = Criticality::Advisory;
        self
    }

    fn first_pass_only(mut self) -> Self {
        self.scope = StepScope::FirstPassOnly;
        self
    }

    fn settle(mut self, secs: u64) -> Self {
        self.settle = Duration::from_secs(secs);
        self
    }

    pub fn runs_on_pass(&self, pass: usize) -> bool {
        pass == 0 || self.scope == StepScope::EveryPass
    }
}

/// Quote `text` as an XPath 1.0 string literal.
///
/// XPath 1.0 has no escapes, so text holding both quote kinds is spliced
/// together with `concat()`.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    let parts: Vec<String> = text
        .split('"')
        .map(|part| format!("\"{part}\""))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}

/// The walk for `instrument` over `window`.
pub fn script(instrument: &Instrument, window: &DateWindow) -> Vec<Step> {
    use StepKind::*;

    vec![
        Step::click(
            DismissConsent,
            "dismiss cookie consent",
            Locator::XPath(r#"//span[@class="new-ui-button__label" and text()="Принять"]"#.into()),
        )
        .advisory()
        .first_pass_only(),
        Step::click(
            OpenMenu,
            "open site menu",
            Locator::Css(".header__button.header-col.header-col--burger".into()),
        )
        .first_pass_only(),
        Step::click(
            OpenMarketSection,
            "open derivatives market section",
            Locator::LinkText("Срочный рынок".into()),
        )
        .first_pass_only()
        .settle(3),
        Step::click(
            AcceptTerms,
            "accept terms of use",
            Locator::XPath(r#"//a[@class="btn2 btn2-primary" and text()="Согласен"]"#.into()),
        )
        .advisory()
        .first_pass_only(),
        Step::click(
            OpenRatesListing,
            "open indicative rates",
            Locator::LinkText("Индикативные курсы".into()),
        )
        .first_pass_only(),
        Step::click(
            OpenInstrumentSelector,
            "open instrument selector",
            Locator::XPath(r#"//div[@class="ui-select__activator -selected"]"#.into()),
        ),
        Step::click(
            SelectInstrument,
            &format!("select {}", instrument.code),
            Locator::XPath(format!(
                "//a[contains(text(), {})]",
                xpath_literal(&instrument.selector_text)
            )),
        )
        .settle(5),
        Step::fill(
            FillStartDate,
            "fill start date",
            Locator::Id("fromDate".into()),
            window.start_str(),
        ),
        Step::fill(
            FillEndDate,
            "fill end date",
            Locator::Id("tillDate".into()),
            window.end_str(),
        ),
        Step::click(
            SubmitQuery,
            "submit rate query",
            Locator::XPath(r#"//button[@type="submit" and @aria-label="Показать"]"#.into()),
        )
        .settle(5),
        Step::click(
            ExportXml,
            "export rates as XML",
            Locator::XPath(r#"//a[text()="Получить данные в XML"]"#.into()),
        )
        .settle(10),
    ]
}
