use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use time::Duration;

use crate::config::{CookieConfig, SameSitePolicy};

/// Refresh-token cookie: HttpOnly, site-wide, lives as long as the token.
pub fn refresh_cookie(config: &CookieConfig, token: &str, ttl_seconds: u64) -> Cookie<'static> {
    Cookie::build((config.name.clone(), token.to_string()))
        .http_only(true)
        .secure(config.secure)
        .same_site(same_site(config.same_site))
        .path("/")
        .max_age(Duration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)))
        .build()
}

/// Removal cookie for the refresh token.
pub fn clear_refresh_cookie(config: &CookieConfig) -> Cookie<'static> {
    Cookie::build((config.name.clone(), ""))
        .http_only(true)
        .secure(config.secure)
        .same_site(same_site(config.same_site))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

pub fn refresh_token_from(jar: &CookieJar, config: &CookieConfig) -> Option<String> {
    jar.get(&config.name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::Strict => SameSite::Strict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_cookie_attributes() {
        let config = CookieConfig::default();
        let cookie = refresh_cookie(&config, "tok", 604_800);

        assert_eq!(cookie.name(), "refresh_token");
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::days(7)));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let config = CookieConfig {
            same_site: SameSitePolicy::Strict,
            secure: false,
            ..CookieConfig::default()
        };
        let cookie = clear_refresh_cookie(&config);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.secure(), Some(false));
    }
}
