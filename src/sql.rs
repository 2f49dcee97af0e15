//! The SQL boundary: every emitted statement is built here, from structured
//! values, and returned as text. The tiling/encoding core never formats SQL.
//!
//! Targets the PostGIS WKT Raster catalog: `AddRasterColumn` registration,
//! `DropRasterTable`, and the `raster_overviews` overview catalog.

use crate::error::{LoaderError, Result};

pub(crate) const SQL_BEGIN: &str = "BEGIN;\n";
pub(crate) const SQL_END: &str = "END;\n";

/// Split a `[schema.]table` destination, defaulting the schema to `public`.
pub(crate) fn schema_table(destination: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = destination.split('.').collect();
    match parts.as_slice() {
        [table] => Ok(("public".to_string(), table.to_string())),
        [schema, table] => Ok((schema.to_string(), table.to_string())),
        _ => Err(LoaderError::InvalidTableName(destination.to_string())),
    }
}

pub(crate) fn full_table_name(schema: &str, table: &str) -> String {
    format!("\"{schema}\".\"{table}\"")
}

fn quote_name(name: &str) -> String {
    if name.starts_with('"') && name.ends_with('"') {
        name.to_string()
    } else {
        format!("\"{name}\"")
    }
}

fn string_array(values: &[&str]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
    format!("ARRAY[{}]", quoted.join(","))
}

fn float_array(values: &[f64]) -> String {
    let formatted: Vec<String> = values.iter().map(|v| float_literal(*v)).collect();
    format!("ARRAY[{}]", formatted.join(","))
}

/// Whole numbers keep a trailing `.0` so the literal stays a float.
fn float_literal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

pub(crate) fn drop_raster_table(schema: &str, table: &str) -> String {
    format!("SELECT DropRasterTable('{schema}', '{table}');\n")
}

/// CREATE TABLE for the destination. The raster column of the base table is
/// added later by `AddRasterColumn`; overview tables carry it directly.
pub(crate) fn create_table(
    schema: &str,
    table: &str,
    column: &str,
    filename_column: bool,
    is_overview: bool,
) -> String {
    let mut columns = String::from("rid serial PRIMARY KEY");
    if filename_column {
        columns.push_str(", \"filename\" text");
    }
    if is_overview {
        columns.push_str(&format!(", {} RASTER", quote_name(column)));
    }
    format!(
        "CREATE TABLE {} ({columns});\n",
        full_table_name(schema, table)
    )
}

/// Regular-blocking metadata carried by the registration call.
pub(crate) struct Blocking {
    pub block: (usize, usize),
    /// Extent corners in UL, LL, UR, LR order.
    pub extent: [(f64, f64); 4],
}

/// Everything `AddRasterColumn` needs for the base-table registration.
pub(crate) struct RasterRegistration<'a> {
    pub schema: &'a str,
    pub table: &'a str,
    pub column: &'a str,
    pub srid: i32,
    pub pixel_types: &'a [&'static str],
    pub out_db: bool,
    pub nodata: &'a [f64],
    pub pixel_size: (f64, f64),
    pub blocking: Option<Blocking>,
}

pub(crate) fn add_raster_column(reg: &RasterRegistration<'_>) -> String {
    let pixel_types = string_array(reg.pixel_types);
    let nodata = if reg.nodata.is_empty() {
        "null".to_string()
    } else {
        float_array(reg.nodata)
    };
    let out_db = if reg.out_db { "true" } else { "false" };

    let (regular_blocking, block_w, block_h, extent) = match &reg.blocking {
        Some(blocking) => {
            let [ul, ll, ur, lr] = blocking.extent;
            let polygon = format!(
                "ST_Envelope(ST_SetSRID('POLYGON(({:.15} {:.15},{:.15} {:.15},{:.15} {:.15},{:.15} {:.15},{:.15} {:.15}))'::geometry, {}))",
                ul.0, ul.1, ll.0, ll.1, ur.0, ur.1, lr.0, lr.1, ul.0, ul.1, reg.srid
            );
            (
                "true",
                blocking.block.0.to_string(),
                blocking.block.1.to_string(),
                polygon,
            )
        }
        None => (
            "false",
            "null".to_string(),
            "null".to_string(),
            "null".to_string(),
        ),
    };

    format!(
        "SELECT AddRasterColumn('{}','{}','{}',{}, {}, {}, {}, {}, {:.15}, {:.15}, {}, {}, {});\n",
        reg.schema,
        reg.table,
        reg.column,
        reg.srid,
        pixel_types,
        out_db,
        regular_blocking,
        nodata,
        reg.pixel_size.0,
        reg.pixel_size.1,
        block_w,
        block_h,
        extent
    )
}

/// DDL for the fixed-schema overview catalog.
pub(crate) fn create_raster_overviews(schema: &str) -> String {
    let table = full_table_name(schema, "raster_overviews");
    format!(
        "CREATE TABLE {table} ( \
         o_table_catalog character varying(256) NOT NULL, \
         o_table_schema character varying(256) NOT NULL, \
         o_table_name character varying(256) NOT NULL, \
         o_column character varying(256) NOT NULL, \
         r_table_catalog character varying(256) NOT NULL, \
         r_table_schema character varying(256) NOT NULL, \
         r_table_name character varying(256) NOT NULL, \
         r_column character varying(256) NOT NULL, \
         out_db boolean NOT NULL, \
         overview_factor integer NOT NULL, \
         CONSTRAINT raster_overviews_pk \
         PRIMARY KEY (o_table_catalog, o_table_schema, o_table_name, o_column, overview_factor));\n"
    )
}

pub(crate) fn register_overview(
    schema: &str,
    overview_table: &str,
    base_table: &str,
    column: &str,
    factor: usize,
) -> String {
    format!(
        "INSERT INTO public.raster_overviews( \
         o_table_catalog, o_table_schema, o_table_name, o_column, \
         r_table_catalog, r_table_schema, r_table_name, r_column, out_db, overview_factor) \
         VALUES ('', '{schema}', '{overview_table}', '{column}', '', '{schema}', '{base_table}', '{column}', FALSE, {factor});\n"
    )
}

pub(crate) fn insert_tile(
    schema: &str,
    table: &str,
    column: &str,
    hexwkb: &str,
    filename: Option<&str>,
) -> String {
    let target = full_table_name(schema, table);
    match filename {
        Some(file) => format!(
            "INSERT INTO {target} ( filename, {column} ) VALUES ( ('{file}')::text, ('{hexwkb}')::raster );\n"
        ),
        None => format!("INSERT INTO {target} ( {column} ) VALUES ( ('{hexwkb}')::raster );\n"),
    }
}

pub(crate) fn create_gist_index(schema: &str, table: &str, column: &str) -> String {
    format!(
        "CREATE INDEX \"{table}_{column}_gist_idx\" ON {} USING GIST (st_convexhull({column}));\n",
        full_table_name(schema, table)
    )
}

pub(crate) fn vacuum(schema: &str, table: &str) -> String {
    format!("VACUUM ANALYZE {};\n", full_table_name(schema, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_table_defaults_to_public() {
        assert_eq!(
            schema_table("rasters").expect("bare"),
            ("public".to_string(), "rasters".to_string())
        );
        assert_eq!(
            schema_table("gis.rasters").expect("qualified"),
            ("gis".to_string(), "rasters".to_string())
        );
        let err = schema_table("a.b.c").expect_err("too many parts");
        assert!(matches!(err, LoaderError::InvalidTableName(_)));
    }

    #[test]
    fn create_table_variants() {
        assert_eq!(
            create_table("public", "t", "rast", false, false),
            "CREATE TABLE \"public\".\"t\" (rid serial PRIMARY KEY);\n"
        );
        assert_eq!(
            create_table("public", "t", "rast", true, false),
            "CREATE TABLE \"public\".\"t\" (rid serial PRIMARY KEY, \"filename\" text);\n"
        );
        assert_eq!(
            create_table("public", "o_2_t", "rast", false, true),
            "CREATE TABLE \"public\".\"o_2_t\" (rid serial PRIMARY KEY, \"rast\" RASTER);\n"
        );
        assert_eq!(
            create_table("public", "o_2_t", "rast", true, true),
            "CREATE TABLE \"public\".\"o_2_t\" (rid serial PRIMARY KEY, \"filename\" text, \"rast\" RASTER);\n"
        );
    }

    #[test]
    fn add_raster_column_without_blocking() {
        let sql = add_raster_column(&RasterRegistration {
            schema: "public",
            table: "t",
            column: "rast",
            srid: -1,
            pixel_types: &["8BUI"],
            out_db: false,
            nodata: &[],
            pixel_size: (1.0, -1.0),
            blocking: None,
        });
        assert!(sql.starts_with("SELECT AddRasterColumn('public','t','rast',-1, ARRAY['8BUI'], false, false, null,"));
        assert!(sql.contains(" null, null, null);\n"));
    }

    #[test]
    fn add_raster_column_with_blocking_carries_extent() {
        let sql = add_raster_column(&RasterRegistration {
            schema: "gis",
            table: "dem",
            column: "rast",
            srid: 4326,
            pixel_types: &["16BSI", "16BSI"],
            out_db: true,
            nodata: &[-32768.0],
            pixel_size: (0.5, -0.5),
            blocking: Some(Blocking {
                block: (64, 64),
                extent: [(0.0, 10.0), (0.0, 0.0), (10.0, 10.0), (10.0, 0.0)],
            }),
        });
        assert!(sql.contains("ARRAY['16BSI','16BSI'], true, true, ARRAY[-32768.0]"));
        assert!(sql.contains(", 64, 64, ST_Envelope(ST_SetSRID('POLYGON(("));
        assert!(sql.contains("::geometry, 4326))"));
    }

    #[test]
    fn nodata_array_keeps_float_literals() {
        let sql = add_raster_column(&RasterRegistration {
            schema: "public",
            table: "t",
            column: "rast",
            srid: -1,
            pixel_types: &["64BF", "64BF"],
            out_db: false,
            nodata: &[0.0, -0.5],
            pixel_size: (1.0, -1.0),
            blocking: None,
        });
        assert!(sql.contains("ARRAY[0.0,-0.5]"));
    }

    #[test]
    fn overview_catalog_schema() {
        let ddl = create_raster_overviews("public");
        for column in [
            "o_table_catalog",
            "o_table_schema",
            "o_table_name",
            "o_column",
            "r_table_catalog",
            "r_table_schema",
            "r_table_name",
            "r_column",
            "out_db",
            "overview_factor",
        ] {
            assert!(ddl.contains(column), "missing column {column}");
        }
        assert!(ddl.contains(
            "PRIMARY KEY (o_table_catalog, o_table_schema, o_table_name, o_column, overview_factor)"
        ));

        let row = register_overview("public", "o_2_dem", "dem", "rast", 2);
        assert!(row.contains("'o_2_dem', 'rast'"));
        assert!(row.ends_with("FALSE, 2);\n"));
    }

    #[test]
    fn insert_statements() {
        assert_eq!(
            insert_tile("public", "t", "rast", "0100", None),
            "INSERT INTO \"public\".\"t\" ( rast ) VALUES ( ('0100')::raster );\n"
        );
        assert_eq!(
            insert_tile("public", "t", "rast", "0100", Some("a.tif")),
            "INSERT INTO \"public\".\"t\" ( filename, rast ) VALUES ( ('a.tif')::text, ('0100')::raster );\n"
        );
    }

    #[test]
    fn index_and_vacuum_statements() {
        assert_eq!(
            create_gist_index("public", "t", "rast"),
            "CREATE INDEX \"t_rast_gist_idx\" ON \"public\".\"t\" USING GIST (st_convexhull(rast));\n"
        );
        assert_eq!(vacuum("public", "t"), "VACUUM ANALYZE \"public\".\"t\";\n");
    }
}
