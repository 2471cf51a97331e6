//! The schema description shared by the database bootstrap, the system prompt
//! and the `schema` tool. Edit it here only.

/// `CREATE TABLE` text for the two tables the assistant can query.
pub const SCHEMA_DDL: &str = "\
CREATE TABLE products (
  id integer PRIMARY KEY AUTOINCREMENT NOT NULL,
  name text NOT NULL,
  category text NOT NULL,
  price real NOT NULL,
  stock integer DEFAULT 0 NOT NULL,
  created_at text DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE sales (
  id integer PRIMARY KEY AUTOINCREMENT NOT NULL,
  product_id integer NOT NULL,
  quantity integer NOT NULL,
  total_amount real NOT NULL,
  sale_date text DEFAULT CURRENT_TIMESTAMP,
  customer_name text NOT NULL,
  region text NOT NULL,
  FOREIGN KEY (product_id) REFERENCES products(id) ON UPDATE no action ON DELETE no action
);";

pub const TABLES: [&str; 2] = ["products", "sales"];

/// Small data set inserted into a freshly created database.
pub(crate) const DEMO_DATA: &str = "\
INSERT INTO products (name, category, price, stock, created_at) VALUES
  ('Wireless Mouse', 'Electronics', 24.99, 150, '2024-01-05 09:00:00'),
  ('Mechanical Keyboard', 'Electronics', 89.5, 80, '2024-01-06 10:30:00'),
  ('27\" Monitor', 'Electronics', 219.0, 35, '2024-01-10 14:15:00'),
  ('Standing Desk', 'Furniture', 349.0, 12, '2024-02-01 08:45:00'),
  ('Office Chair', 'Furniture', 179.99, 20, '2024-02-03 11:20:00'),
  ('Notebook Pack', 'Stationery', 7.25, 500, '2024-02-15 16:00:00');

INSERT INTO sales (product_id, quantity, total_amount, sale_date, customer_name, region) VALUES
  (1, 3, 74.97, '2024-03-01 10:12:00', 'Alice Johnson', 'North'),
  (2, 1, 89.5, '2024-03-02 13:40:00', 'Bob Smith', 'South'),
  (3, 2, 438.0, '2024-03-03 09:05:00', 'Carla Gomez', 'West'),
  (4, 1, 349.0, '2024-03-07 15:30:00', 'Dan Miller', 'East'),
  (1, 5, 124.95, '2024-03-09 12:00:00', 'Erin Brown', 'North'),
  (6, 20, 145.0, '2024-03-11 17:45:00', 'Frank Lee', 'South'),
  (5, 2, 359.98, '2024-03-14 11:10:00', 'Alice Johnson', 'North');";

/// Column names per table, parsed from [`SCHEMA_DDL`] in declaration order.
#[must_use]
pub fn declared_columns(ddl: &str) -> Vec<(String, Vec<(String, String)>)> {
    let mut tables = Vec::new();
    for statement in ddl.split(';') {
        let statement = statement.trim();
        let Some(rest) = statement.strip_prefix("CREATE TABLE") else {
            continue;
        };
        let Some((name, body)) = rest.split_once('(') else {
            continue;
        };
        let Some(body) = body.trim_end().strip_suffix(')') else {
            continue;
        };
        let columns = split_top_level(body)
            .into_iter()
            .filter_map(|definition| {
                let mut words = definition.split_whitespace();
                let column = words.next()?;
                let kind = words.next()?;
                let is_constraint = matches!(
                    column.to_ascii_uppercase().as_str(),
                    "FOREIGN" | "PRIMARY" | "UNIQUE" | "CHECK" | "CONSTRAINT"
                );
                (!is_constraint).then(|| (column.to_string(), kind.to_ascii_lowercase()))
            })
            .collect();
        tables.push((name.trim().to_string(), columns));
    }
    tables
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_columns_lists_both_tables() {
        let tables = declared_columns(SCHEMA_DDL);
        let names: Vec<_> = tables.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, TABLES);

        let products = &tables[0].1;
        assert_eq!(products.len(), 6);
        assert_eq!(products[3], ("price".to_string(), "real".to_string()));

        let sales: Vec<_> = tables[1].1.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(
            sales,
            [
                "id",
                "product_id",
                "quantity",
                "total_amount",
                "sale_date",
                "customer_name",
                "region"
            ]
        );
    }
}
