//! JavaScript evaluated inside captured pages.
//!
//! Scripts return plain JSON so results deserialize straight into the
//! extractor's structs.

/// Enumerate every downloadable resource referenced by the page: images
/// (src, srcset candidates, picture sources, inline-style url()), external
/// and inline stylesheets, scripts, and the favicon. `data:` URLs are
/// skipped.
pub const CAPTURE_RESOURCES_SCRIPT: &str = r#"
    (() => {
        const images = [];
        const pushImage = (raw) => {
            if (!raw || raw.startsWith('data:')) return;
            try {
                images.push(new URL(raw, document.baseURI).href);
            } catch (e) {}
        };

        document.querySelectorAll('img').forEach(img => {
            if (img.getAttribute('src')) pushImage(img.src);
            const srcset = img.getAttribute('srcset');
            if (srcset) {
                srcset.split(',').forEach(candidate => {
                    const url = candidate.trim().split(/\s+/)[0];
                    if (url) pushImage(url);
                });
            }
        });

        document.querySelectorAll('picture > source[srcset]').forEach(source => {
            source.getAttribute('srcset').split(',').forEach(candidate => {
                const url = candidate.trim().split(/\s+/)[0];
                if (url) pushImage(url);
            });
        });

        const urlPattern = /url\(\s*['"]?([^'")]+)['"]?\s*\)/g;
        document.querySelectorAll('[style]').forEach(el => {
            const style = el.getAttribute('style') || '';
            let match;
            while ((match = urlPattern.exec(style)) !== null) {
                pushImage(match[1]);
            }
        });

        const stylesheets = [];
        document.querySelectorAll('link[rel="stylesheet"]').forEach(link => {
            if (link.href) {
                stylesheets.push({
                    url: link.href,
                    inline: false,
                    content: null,
                    index: stylesheets.length
                });
            }
        });
        document.querySelectorAll('style').forEach(style => {
            stylesheets.push({
                url: null,
                inline: true,
                content: style.textContent || '',
                index: stylesheets.length
            });
        });

        const scripts = Array.from(document.querySelectorAll('script[src]'))
            .map(script => script.src)
            .filter(src => src && !src.startsWith('data:'));

        const favicon = document.querySelector('link[rel*="icon"]')?.href || null;

        const pdfs = Array.from(document.querySelectorAll('a[href]'))
            .map(a => a.href)
            .filter(href => {
                try {
                    return new URL(href).pathname.toLowerCase().endsWith('.pdf');
                } catch (e) {
                    return false;
                }
            });

        return {
            images: Array.from(new Set(images)),
            imageCount: document.querySelectorAll('img[src]').length,
            stylesheets,
            scripts: Array.from(new Set(scripts)),
            pdfs: Array.from(new Set(pdfs)),
            favicon
        };
    })()
"#;

/// Page metadata for discovery crawls: title, description, per-kind
/// resource counts, outbound HTTP links (first 100, anchors and non-HTTP
/// schemes dropped), and HTML length for the size estimate.
pub const DISCOVERY_SCRIPT: &str = r#"
    (() => {
        const meta = document.querySelector('meta[name="description"], meta[property="og:description"]');

        const links = [];
        document.querySelectorAll('a[href]').forEach(a => {
            const href = a.getAttribute('href');
            if (!href || href.startsWith('#')) return;
            let url;
            try {
                url = new URL(href, window.location.href);
            } catch (e) {
                return;
            }
            if (!['http:', 'https:'].includes(url.protocol)) return;
            links.push(url.href);
        });
        const unique = Array.from(new Set(links)).slice(0, 100);

        return {
            title: document.title || '',
            description: meta ? (meta.getAttribute('content') || '') : '',
            images: document.querySelectorAll('img[src]').length,
            css: document.querySelectorAll('link[rel="stylesheet"]').length
                + document.querySelectorAll('style').length,
            js: document.querySelectorAll('script[src]').length,
            fonts: document.querySelectorAll('link[rel="preload"][as="font"], link[rel="font"]').length,
            links: unique,
            htmlLength: document.documentElement.outerHTML.length
        };
    })()
"#;

/// True when the page carries lazy-loading image markers.
pub const LAZY_IMAGE_PROBE_SCRIPT: &str = r#"
    !!document.querySelector('img[loading="lazy"], img[data-src], img[data-lazy]')
"#;

/// One scroll pass in 500-px steps with 200 ms pauses, then back to the
/// top, so lazy images enter the viewport and load before extraction.
pub const LAZY_SCROLL_SCRIPT: &str = r"
    (async () => {
        const sleep = (ms) => new Promise(resolve => setTimeout(resolve, ms));
        const total = Math.max(
            document.body ? document.body.scrollHeight : 0,
            document.documentElement.scrollHeight
        );
        for (let y = 0; y < total; y += 500) {
            window.scrollTo(0, y);
            await sleep(200);
        }
        window.scrollTo(0, 0);
        return true;
    })()
";
