//! VOTable reader for datalink responses.
//!
//! Only the subset used by datalink services is read: the `FIELD` list and `TABLEDATA` rows of
//! the first results table, plus every `RESOURCE type="meta" utype="adhoc:service"` block, which
//! becomes a [`ServiceDescriptor`](crate::table::ServiceDescriptor).
//!
//! Binary serializations (`BINARY`, `BINARY2`, `FITS`) are not supported; such tables load with
//! their columns and no rows.

use quick_xml::de::from_str;
use serde::Deserialize;

use crate::{
    dataprod_errors::DataProdError,
    table::{Column, ServiceDescriptor, ServiceParam, TableModel},
};

#[derive(Debug, Deserialize)]
struct VoTableDoc {
    #[serde(rename = "RESOURCE", default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(rename = "@type")]
    rtype: Option<String>,
    #[serde(rename = "@utype")]
    utype: Option<String>,
    #[serde(rename = "@ID")]
    id: Option<String>,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "DESCRIPTION")]
    description: Option<String>,
    #[serde(rename = "PARAM", default)]
    params: Vec<Param>,
    #[serde(rename = "GROUP", default)]
    groups: Vec<Group>,
    #[serde(rename = "TABLE", default)]
    tables: Vec<Table>,
}

#[derive(Debug, Deserialize)]
struct Param {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value")]
    value: Option<String>,
    #[serde(rename = "@ref")]
    ref_id: Option<String>,
    #[serde(rename = "VALUES")]
    values: Option<Values>,
}

#[derive(Debug, Deserialize)]
struct Values {
    #[serde(rename = "OPTION", default)]
    options: Vec<OptionValue>,
}

#[derive(Debug, Deserialize)]
struct OptionValue {
    #[serde(rename = "@value")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Group {
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "PARAM", default)]
    params: Vec<Param>,
}

#[derive(Debug, Deserialize)]
struct Table {
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "FIELD", default)]
    fields: Vec<Field>,
    #[serde(rename = "DATA")]
    data: Option<Data>,
}

#[derive(Debug, Deserialize)]
struct Field {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@ID")]
    id: Option<String>,
    #[serde(rename = "@datatype")]
    datatype: Option<String>,
    #[serde(rename = "@ucd")]
    ucd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Data {
    #[serde(rename = "TABLEDATA")]
    tabledata: Option<TableData>,
}

#[derive(Debug, Deserialize)]
struct TableData {
    #[serde(rename = "TR", default)]
    rows: Vec<Tr>,
}

#[derive(Debug, Deserialize)]
struct Tr {
    #[serde(rename = "TD", default)]
    cells: Vec<Td>,
}

#[derive(Debug, Deserialize)]
struct Td {
    #[serde(rename = "$text", default)]
    value: String,
}

fn is_service_resource(r: &Resource) -> bool {
    r.rtype.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("meta"))
        && r.utype
            .as_deref()
            .is_some_and(|u| u.eq_ignore_ascii_case("adhoc:service"))
        && r.params
            .iter()
            .any(|p| p.name == "accessURL" && p.value.as_deref().is_some_and(|v| !v.is_empty()))
}

fn to_service_param(p: &Param, columns: &[Column]) -> ServiceParam {
    let col_name = p.ref_id.as_ref().and_then(|r| {
        columns
            .iter()
            .find(|c| c.id.as_deref() == Some(r.as_str()) || &c.name == r)
            .map(|c| c.name.clone())
    });
    let options = p.values.as_ref().and_then(|v| {
        (!v.options.is_empty()).then(|| {
            v.options
                .iter()
                .map(|o| o.value.as_str())
                .collect::<Vec<_>>()
                .join(",")
        })
    });
    ServiceParam {
        name: p.name.clone(),
        value: p.value.clone().filter(|v| !v.is_empty()),
        ref_id: p.ref_id.clone(),
        col_name,
        options,
    }
}

fn to_service_descriptor(idx: usize, r: &Resource, columns: &[Column]) -> ServiceDescriptor {
    let param = |name: &str| {
        r.params
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.clone())
    };
    ServiceDescriptor {
        id: r.id.clone(),
        title: r
            .description
            .clone()
            .or_else(|| r.name.clone())
            .unwrap_or_else(|| format!("Service Descriptor {idx}")),
        access_url: param("accessURL").unwrap_or_default(),
        standard_id: param("standardID"),
        url_params: r
            .groups
            .iter()
            .find(|g| g.name.as_deref() == Some("inputParams"))
            .map(|g| g.params.iter().map(|p| to_service_param(p, columns)).collect())
            .unwrap_or_default(),
    }
}

/// Parse a VOTable document into a [`TableModel`].
///
/// Arguments
/// -----------------
/// * `tbl_id`: Identifier given to the resulting table.
/// * `xml`: The VOTable document.
///
/// Return
/// ----------
/// * The first table of the first `results` resource (or of the first resource holding a
///   table), with every service descriptor of the document attached.
/// * A [`DataProdError::VoTableError`] when the document is not well-formed.
pub fn parse_votable(tbl_id: &str, xml: &str) -> Result<TableModel, DataProdError> {
    let doc: VoTableDoc = from_str(xml)?;

    let results = doc
        .resources
        .iter()
        .filter(|r| !r.tables.is_empty())
        .find(|r| r.rtype.as_deref() == Some("results"))
        .or_else(|| doc.resources.iter().find(|r| !r.tables.is_empty()));

    let mut table = TableModel {
        tbl_id: tbl_id.to_string(),
        ..Default::default()
    };

    if let Some(first) = results.and_then(|r| r.tables.first()) {
        table.title = first.name.clone();
        table.columns = first
            .fields
            .iter()
            .map(|f| Column {
                name: f.name.clone(),
                id: f.id.clone(),
                data_type: f.datatype.clone(),
                ucd: f.ucd.clone(),
            })
            .collect();
        table.rows = first
            .data
            .as_ref()
            .and_then(|d| d.tabledata.as_ref())
            .map(|td| {
                td.rows
                    .iter()
                    .map(|tr| tr.cells.iter().map(|c| c.value.trim().to_string()).collect())
                    .collect()
            })
            .unwrap_or_default();
    }

    table.service_descriptors = doc
        .resources
        .iter()
        .filter(|r| is_service_resource(r))
        .enumerate()
        .map(|(idx, r)| to_service_descriptor(idx, r, &table.columns))
        .collect();

    Ok(table)
}

#[cfg(test)]
mod votable_test {
    use super::*;

    const DATALINK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VOTABLE version="1.3" xmlns="http://www.ivoa.net/xml/VOTable/v1.3">
  <RESOURCE type="results">
    <TABLE name="links">
      <FIELD name="ID" ID="primaryID" datatype="char" arraysize="*"/>
      <FIELD name="access_url" datatype="char" arraysize="*"/>
      <FIELD name="service_def" datatype="char" arraysize="*"/>
      <FIELD name="error_message" datatype="char" arraysize="*"/>
      <FIELD name="semantics" datatype="char" arraysize="*"/>
      <FIELD name="content_type" datatype="char" arraysize="*"/>
      <FIELD name="content_length" datatype="long"/>
      <DATA>
        <TABLEDATA>
          <TR><TD>ivo://x?a</TD><TD>https://x.org/a.fits</TD><TD/><TD/><TD>#this</TD><TD>image/fits</TD><TD>2048</TD></TR>
          <TR><TD>ivo://x?a</TD><TD/><TD>soda</TD><TD/><TD>#cutout</TD><TD>image/fits</TD><TD/></TR>
        </TABLEDATA>
      </DATA>
    </TABLE>
  </RESOURCE>
  <RESOURCE type="meta" utype="adhoc:service" ID="soda">
    <DESCRIPTION>Cutout service</DESCRIPTION>
    <PARAM name="standardID" datatype="char" arraysize="*" value="ivo://ivoa.net/std/SODA#sync-1.0"/>
    <PARAM name="accessURL" datatype="char" arraysize="*" value="https://x.org/soda"/>
    <GROUP name="inputParams">
      <PARAM name="ID" datatype="char" arraysize="*" ref="primaryID" value=""/>
      <PARAM name="CIRCLE" datatype="double" arraysize="3" value=""/>
      <PARAM name="BAND" datatype="char" arraysize="*" value="">
        <VALUES><OPTION value="g"/><OPTION value="r"/></VALUES>
      </PARAM>
    </GROUP>
  </RESOURCE>
</VOTABLE>"#;

    #[test]
    fn test_parse_datalink_votable() {
        let table = parse_votable("dl-1", DATALINK_XML).unwrap();
        assert_eq!(table.columns.len(), 7);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, "access_url"), Some("https://x.org/a.fits"));
        assert_eq!(table.cell(1, "service_def"), Some("soda"));
        assert_eq!(table.cell(1, "content_length"), Some(""));

        assert_eq!(table.service_descriptors.len(), 1);
        let sd = &table.service_descriptors[0];
        assert_eq!(sd.id.as_deref(), Some("soda"));
        assert_eq!(sd.title, "Cutout service");
        assert_eq!(sd.access_url, "https://x.org/soda");
        assert_eq!(sd.url_params.len(), 3);
        assert_eq!(sd.url_params[0].col_name.as_deref(), Some("ID"));
        assert!(sd.url_params[1].is_optional());
        assert_eq!(sd.url_params[2].options.as_deref(), Some("g,r"));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_votable("x", "<VOTABLE><RESOURCE></TABLE></VOTABLE>").is_err());
    }
}
