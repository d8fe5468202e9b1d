//! Scripted walk from the landing page to the catalog page.

use crate::browser::{PageClient, ScrapeError};
use crate::config::sites::{NavAction, NavStep};
use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Run `steps` in order on the current page. A required step whose target
/// never appears within `wait` ends the run with [`ScrapeError::Navigation`].
/// Returns the URL the page ends on.
pub async fn follow_steps<P: PageClient + ?Sized>(
    page: &mut P,
    steps: &[NavStep],
    wait: Duration,
    settle: Duration,
) -> Result<String> {
    for step in steps {
        let Some(el) = step.locate.wait_for(&*page, wait).await? else {
            if step.optional {
                warn!("No {} found, continuing", step.name);
                continue;
            }
            return Err(ScrapeError::Navigation {
                step: step.name.clone(),
                locator: step.locate.to_string(),
            }
            .into());
        };

        debug!("{:?} {}", step.action, step.name);
        match step.action {
            NavAction::Click => page.click(el).await?,
            NavAction::Hover => page.hover(el).await?,
        }

        if !settle.is_zero() {
            sleep(settle).await;
        }
    }

    let url = page.current_url().ok_or(ScrapeError::NoPage)?;
    info!("Catalog page: {}", url);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::html_client::testing::MemorySource;
    use crate::browser::html_client::HtmlPageClient;
    use crate::browser::{LocateStrategy, Locator};

    const HOME: &str = "https://shop.test/";

    fn step(name: &str, css: &str, text: &str, action: NavAction, optional: bool) -> NavStep {
        NavStep {
            name: name.to_string(),
            locate: LocateStrategy::single(Locator::css(css).with_text(text)),
            action,
            optional,
        }
    }

    async fn client() -> HtmlPageClient<MemorySource> {
        let source = MemorySource::new()
            .with_page(
                HOME,
                r#"<nav><a href="/computing">Computing</a>
                   <a href="/c/gpu">GPU - NVIDIA Gaming</a></nav>"#,
            )
            .with_page(
                "https://shop.test/c/gpu",
                r#"<a href="/c/gpu/rtx-3060">GeForce RTX 3060 (3584 Cores)</a>"#,
            )
            .with_page("https://shop.test/c/gpu/rtx-3060", "<ul class='productColumns'></ul>");
        let mut c = HtmlPageClient::new(source);
        c.navigate(HOME).await.unwrap();
        c
    }

    #[tokio::test]
    async fn test_follows_clicks_to_catalog() {
        let mut page = client().await;
        let steps = vec![
            step("cookies", "div.inner button", "", NavAction::Click, true),
            step("computing", "a", "Computing", NavAction::Hover, false),
            step("family", "a", "GPU - NVIDIA Gaming", NavAction::Click, false),
            step("catalog", "a", "GeForce RTX 3060 (3584 Cores)", NavAction::Click, false),
        ];

        let url = follow_steps(&mut page, &steps, Duration::ZERO, Duration::ZERO).await.unwrap();
        assert_eq!(url, "https://shop.test/c/gpu/rtx-3060");
    }

    #[tokio::test]
    async fn test_missing_required_step_is_fatal() {
        let mut page = client().await;
        let steps = vec![step("components tab", "span", "Components", NavAction::Click, false)];

        let err = follow_steps(&mut page, &steps, Duration::ZERO, Duration::ZERO)
            .await
            .unwrap_err();
        match err.downcast_ref::<ScrapeError>() {
            Some(ScrapeError::Navigation { step, .. }) => assert_eq!(step, "components tab"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
