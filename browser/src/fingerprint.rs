//! Region-consistent browser fingerprint randomization: user agent, viewport,
//! timezone, language, and geolocation are drawn together so a session never
//! claims to be in Tokyo with a US locale.

use chromiumoxide::page::Page;
use chromiumoxide_cdp::cdp::browser_protocol::browser::{GrantPermissionsParams, PermissionType};
use chromiumoxide_cdp::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetGeolocationOverrideParams,
};
use chromiumoxide_cdp::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide_cdp::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use once_cell::sync::Lazy;

use crate::BrowserError;
use rand::Rng;

/// A small, real-world pool of desktop Chrome user agent strings spanning
/// Windows, macOS and Linux across a few recent major versions.
const CURATED_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

struct RegionProfile {
    timezones: &'static [&'static str],
    languages: &'static [&'static str],
    latitude: f64,
    longitude: f64,
}

static REGION_PROFILES: Lazy<Vec<(&'static str, RegionProfile)>> = Lazy::new(|| {
    vec![
        (
            "US",
            RegionProfile {
                timezones: &["America/New_York", "America/Chicago", "America/Los_Angeles"],
                languages: &["en-US"],
                latitude: 39.8283,
                longitude: -98.5795,
            },
        ),
        (
            "EU",
            RegionProfile {
                timezones: &["Europe/Paris", "Europe/Berlin", "Europe/Madrid"],
                languages: &["en-GB", "fr-FR", "de-DE"],
                latitude: 50.1109,
                longitude: 8.6821,
            },
        ),
        (
            "UK",
            RegionProfile {
                timezones: &["Europe/London"],
                languages: &["en-GB"],
                latitude: 51.5074,
                longitude: -0.1278,
            },
        ),
        (
            "DE",
            RegionProfile {
                timezones: &["Europe/Berlin"],
                languages: &["de-DE"],
                latitude: 52.5200,
                longitude: 13.4050,
            },
        ),
        (
            "FR",
            RegionProfile {
                timezones: &["Europe/Paris"],
                languages: &["fr-FR"],
                latitude: 48.8566,
                longitude: 2.3522,
            },
        ),
        (
            "BR",
            RegionProfile {
                timezones: &["America/Sao_Paulo"],
                languages: &["pt-BR"],
                latitude: -23.5505,
                longitude: -46.6333,
            },
        ),
        (
            "IN",
            RegionProfile {
                timezones: &["Asia/Kolkata"],
                languages: &["en-IN", "hi-IN"],
                latitude: 28.6139,
                longitude: 77.2090,
            },
        ),
        (
            "JP",
            RegionProfile {
                timezones: &["Asia/Tokyo"],
                languages: &["ja-JP"],
                latitude: 35.6762,
                longitude: 139.6503,
            },
        ),
        (
            "AU",
            RegionProfile {
                timezones: &["Australia/Sydney"],
                languages: &["en-AU"],
                latitude: -33.8688,
                longitude: 151.2093,
            },
        ),
        (
            "CA",
            RegionProfile {
                timezones: &["America/Toronto", "America/Vancouver"],
                languages: &["en-CA", "fr-CA"],
                latitude: 45.4215,
                longitude: -75.6972,
            },
        ),
    ]
});

static ALL_TIMEZONES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut tzs: Vec<&'static str> = REGION_PROFILES
        .iter()
        .flat_map(|(_, profile)| profile.timezones.iter().copied())
        .collect();
    tzs.sort_unstable();
    tzs.dedup();
    tzs
});

static ALL_LANGUAGES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut langs: Vec<&'static str> = REGION_PROFILES
        .iter()
        .flat_map(|(_, profile)| profile.languages.iter().copied())
        .collect();
    langs.sort_unstable();
    langs.dedup();
    langs
});

/// Masks `navigator.webdriver`, fakes `window.chrome.runtime`, and patches the
/// notifications permission query so the page's own detection scripts read a
/// normal browser.
pub const WEBDRIVER_OVERRIDE_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) => (
    parameters.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : originalQuery(parameters)
);
"#;

#[derive(Debug, Clone)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct FingerprintProfile {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub timezone: String,
    pub language: String,
    pub geolocation: Option<Geolocation>,
}

/// Generates region-consistent fingerprint profiles and applies them to a
/// live page.
pub struct FingerprintRandomizer;

impl FingerprintRandomizer {
    pub fn new() -> Self {
        Self
    }

    /// When `proxy_region` names a known region, the timezone, language and
    /// geolocation are all drawn from that region's pool; otherwise each is
    /// drawn independently from the global flat pool.
    pub fn generate(&self, proxy_region: Option<&str>) -> FingerprintProfile {
        let mut rng = rand::thread_rng();
        self.generate_with_rng(&mut rng, proxy_region)
    }

    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        proxy_region: Option<&str>,
    ) -> FingerprintProfile {
        let user_agent = CURATED_USER_AGENTS[rng.gen_range(0..CURATED_USER_AGENTS.len())].to_string();
        let viewport_width = rng.gen_range(1280..=1920);
        let viewport_height = rng.gen_range(720..=1080);

        let region = proxy_region
            .and_then(|code| REGION_PROFILES.iter().find(|(key, _)| *key == code));

        let (timezone, language, geolocation) = match region {
            Some((_, profile)) => {
                let tz = profile.timezones[rng.gen_range(0..profile.timezones.len())].to_string();
                let lang = profile.languages[rng.gen_range(0..profile.languages.len())].to_string();
                let geo = Geolocation {
                    latitude: profile.latitude,
                    longitude: profile.longitude,
                };
                (tz, lang, Some(geo))
            }
            None => {
                let tz = ALL_TIMEZONES[rng.gen_range(0..ALL_TIMEZONES.len())].to_string();
                let lang = ALL_LANGUAGES[rng.gen_range(0..ALL_LANGUAGES.len())].to_string();
                (tz, lang, None)
            }
        };

        FingerprintProfile {
            user_agent,
            viewport_width,
            viewport_height,
            timezone,
            language,
            geolocation,
        }
    }

    /// A human-plausible pause between simulated actions.
    pub fn action_delay(&self, min_ms: u64, max_ms: u64) -> std::time::Duration {
        let mut rng = rand::thread_rng();
        std::time::Duration::from_millis(rng.gen_range(min_ms..=max_ms))
    }
}

impl Default for FingerprintRandomizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Pushes a generated profile onto a live page: viewport, user agent and
/// accept-language headers, geolocation override, and the webdriver-masking
/// init script, which must land before the first navigation to take effect.
pub async fn apply(page: &Page, profile: &FingerprintProfile) -> Result<(), BrowserError> {
    let device_metrics = SetDeviceMetricsOverrideParams::builder()
        .width(profile.viewport_width as i64)
        .height(profile.viewport_height as i64)
        .device_scale_factor(1.0)
        .mobile(false)
        .build()
        .map_err(BrowserError::Cdp)?;
    page.execute(device_metrics)
        .await
        .map_err(|err| BrowserError::Cdp(err.to_string()))?;

    page.execute(SetUserAgentOverrideParams {
        user_agent: profile.user_agent.clone(),
        accept_language: Some(profile.language.clone()),
        platform: None,
        user_agent_metadata: None,
    })
    .await
    .map_err(|err| BrowserError::Cdp(err.to_string()))?;

    if profile.geolocation.is_some() {
        let origin = page.url().await.ok().flatten();
        page.execute(GrantPermissionsParams {
            permissions: vec![PermissionType::Geolocation],
            origin,
            browser_context_id: None,
        })
        .await
        .map_err(|err| BrowserError::Cdp(err.to_string()))?;
    }

    if let Some(geo) = &profile.geolocation {
        let geolocation = SetGeolocationOverrideParams::builder()
            .latitude(geo.latitude)
            .longitude(geo.longitude)
            .accuracy(100.0)
            .build();
        page.execute(geolocation)
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
    }

    page.execute(AddScriptToEvaluateOnNewDocumentParams {
        source: WEBDRIVER_OVERRIDE_JS.to_string(),
        include_command_line_api: None,
        world_name: None,
        run_immediately: None,
    })
    .await
    .map_err(|err| BrowserError::Cdp(err.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn region_profile_keeps_geolocation_consistent() {
        let randomizer = FingerprintRandomizer::new();
        let mut rng = StdRng::seed_from_u64(42);
        let profile = randomizer.generate_with_rng(&mut rng, Some("JP"));
        assert_eq!(profile.timezone, "Asia/Tokyo");
        assert_eq!(profile.language, "ja-JP");
        assert!(profile.geolocation.is_some());
    }

    #[test]
    fn unknown_region_has_no_geolocation() {
        let randomizer = FingerprintRandomizer::new();
        let mut rng = StdRng::seed_from_u64(7);
        let profile = randomizer.generate_with_rng(&mut rng, None);
        assert!(profile.geolocation.is_none());
        assert!(ALL_TIMEZONES.contains(&profile.timezone.as_str()));
    }

    #[test]
    fn viewport_stays_within_bounds() {
        let randomizer = FingerprintRandomizer::new();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let profile = randomizer.generate_with_rng(&mut rng, None);
            assert!((1280..=1920).contains(&profile.viewport_width));
            assert!((720..=1080).contains(&profile.viewport_height));
        }
    }
}
