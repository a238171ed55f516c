//! Server-rendered HTML for the search page and the grouped listing.

use pickup_core::GroupedPickup;

const SEARCH_BODY: &str = include_str!("../assets/index.html");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nav {
    Search,
    Listing,
}

pub fn search_page() -> String {
    layout("Buscar recogidas", Nav::Search, SEARCH_BODY)
}

pub fn listing_page(rows: &[GroupedPickup]) -> String {
    let mut body = format!(
        "<h1>Todas las recogidas</h1>\n<p class=\"summary\">{} recogidas distintas</p>\n",
        rows.len()
    );

    if rows.is_empty() {
        body.push_str("<p class=\"empty\">No hay recogidas cargadas.</p>\n");
        return layout("Todas las recogidas", Nav::Listing, &body);
    }

    body.push_str(
        "<table>\n<thead><tr><th>Nombre</th><th>Direcci\u{f3}n</th><th>Poblaci\u{f3}n</th>\
         <th>CP</th><th>C\u{f3}d. repartidor</th><th>Repartidor</th><th>Total</th></tr></thead>\n<tbody>\n",
    );
    for row in rows {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            cell(row.name.as_deref()),
            cell(row.address.as_deref()),
            cell(row.locality.as_deref()),
            cell(row.postal_code.as_deref()),
            cell(row.carrier_code.as_deref()),
            cell(row.carrier_name.as_deref()),
            row.total,
        ));
    }
    body.push_str("</tbody>\n</table>\n");

    layout("Todas las recogidas", Nav::Listing, &body)
}

fn layout(title: &str, active: Nav, body: &str) -> String {
    let nav_class = |item: Nav| if item == active { " class=\"active\"" } else { "" };
    format!(
        "<!DOCTYPE html>\n<html lang=\"es\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title} | Recogidas</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <nav><a href=\"/\"{search}>Buscar</a><a href=\"/todas\"{listing}>Todas</a></nav>\n\
         <main>\n{body}</main>\n</body>\n</html>\n",
        title = escape_html(title),
        search = nav_class(Nav::Search),
        listing = nav_class(Nav::Listing),
    )
}

const STYLE: &str = "body{font-family:sans-serif;margin:0}\
nav{background:#1f3a5f;padding:.6rem 1rem}\
nav a{color:#fff;margin-right:1rem;text-decoration:none}\
nav a.active{font-weight:bold;text-decoration:underline}\
main{padding:1rem}\
table{border-collapse:collapse;width:100%}\
th,td{border:1px solid #ccc;padding:.3rem .5rem;text-align:left}\
th{background:#eef2f7}";

fn cell(value: Option<&str>) -> String {
    escape_html(value.unwrap_or(""))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
