//! PPTX writer: one picture per slide on a blank layout.
//!
//! Slides are streamed into the package as they are added, so a long deck
//! never has more than one page image in memory. The presentation part,
//! which lists every slide, is written by [`PresentationWriter::finish`].

use super::{content_types, escape, relationships, Package, XML_HEADER};
use crate::error::DocforgeError;
use std::path::Path;

/// Default 4:3 slide, 10 × 7.5 inches, in EMU.
pub const SLIDE_WIDTH_EMU: u64 = 9_144_000;
pub const SLIDE_HEIGHT_EMU: u64 = 6_858_000;

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";

const CT_PRESENTATION: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
const CT_SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
const CT_LAYOUT: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml";
const CT_MASTER: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml";
const CT_THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";

const EMPTY_TREE: &str = r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>"#;

/// Writes a picture-per-slide presentation.
pub struct PresentationWriter {
    package: Package,
    slides: usize,
}

impl PresentationWriter {
    pub fn create(path: &Path) -> Result<Self, DocforgeError> {
        Ok(Self {
            package: Package::create(path)?,
            slides: 0,
        })
    }

    pub fn slide_count(&self) -> usize {
        self.slides
    }

    /// Append a slide showing the PNG at `image` (`width_px` × `height_px`)
    /// anchored top-left at full slide width, aspect ratio kept.
    pub fn add_picture_slide(
        &mut self,
        image: &Path,
        width_px: u32,
        height_px: u32,
    ) -> Result<(), DocforgeError> {
        let n = self.slides + 1;
        let (cx, cy) = picture_extent(width_px, height_px);

        self.package
            .add_file(&format!("ppt/media/image{n}.png"), image)?;
        self.package
            .add(&format!("ppt/slides/slide{n}.xml"), slide_xml(n, cx, cy).as_bytes())?;
        self.package.add(
            &format!("ppt/slides/_rels/slide{n}.xml.rels"),
            relationships(&[
                (
                    "rId1".to_string(),
                    "slideLayout",
                    "../slideLayouts/slideLayout1.xml".to_string(),
                ),
                ("rId2".to_string(), "image", format!("../media/image{n}.png")),
            ])
            .as_bytes(),
        )?;
        self.slides = n;
        Ok(())
    }

    /// Write the presentation-level parts and close the package.
    pub fn finish(mut self) -> Result<(), DocforgeError> {
        let slides = self.slides;

        let mut overrides = vec![
            ("/ppt/presentation.xml".to_string(), CT_PRESENTATION),
            ("/ppt/slideMasters/slideMaster1.xml".to_string(), CT_MASTER),
            ("/ppt/slideLayouts/slideLayout1.xml".to_string(), CT_LAYOUT),
            ("/ppt/theme/theme1.xml".to_string(), CT_THEME),
        ];
        for n in 1..=slides {
            overrides.push((format!("/ppt/slides/slide{n}.xml"), CT_SLIDE));
        }
        self.package.add(
            "[Content_Types].xml",
            content_types(&[("png", "image/png")], &overrides).as_bytes(),
        )?;
        self.package.add(
            "_rels/.rels",
            relationships(&[(
                "rId1".to_string(),
                "officeDocument",
                "ppt/presentation.xml".to_string(),
            )])
            .as_bytes(),
        )?;

        let mut rels = vec![
            (
                "rId1".to_string(),
                "slideMaster",
                "slideMasters/slideMaster1.xml".to_string(),
            ),
            ("rId2".to_string(), "theme", "theme/theme1.xml".to_string()),
        ];
        for n in 1..=slides {
            rels.push((format!("rId{}", n + 2), "slide", format!("slides/slide{n}.xml")));
        }
        self.package
            .add("ppt/_rels/presentation.xml.rels", relationships(&rels).as_bytes())?;
        self.package
            .add("ppt/presentation.xml", presentation_xml(slides).as_bytes())?;

        self.package
            .add("ppt/slideMasters/slideMaster1.xml", MASTER_XML.as_bytes())?;
        self.package.add(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            relationships(&[
                (
                    "rId1".to_string(),
                    "slideLayout",
                    "../slideLayouts/slideLayout1.xml".to_string(),
                ),
                ("rId2".to_string(), "theme", "../theme/theme1.xml".to_string()),
            ])
            .as_bytes(),
        )?;
        self.package
            .add("ppt/slideLayouts/slideLayout1.xml", LAYOUT_XML.as_bytes())?;
        self.package.add(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            relationships(&[(
                "rId1".to_string(),
                "slideMaster",
                "../slideMasters/slideMaster1.xml".to_string(),
            )])
            .as_bytes(),
        )?;
        self.package.add("ppt/theme/theme1.xml", THEME_XML.as_bytes())?;
        self.package.finish()
    }
}

/// Picture size in EMU: full slide width, height from the image's aspect ratio.
fn picture_extent(width_px: u32, height_px: u32) -> (u64, u64) {
    let w = u64::from(width_px.max(1));
    let h = u64::from(height_px.max(1));
    (SLIDE_WIDTH_EMU, SLIDE_WIDTH_EMU * h / w)
}

fn slide_xml(n: usize, cx: u64, cy: u64) -> String {
    format!(
        r#"{XML_HEADER}<p:sld xmlns:a="{NS_A}" xmlns:r="{ns_r}" xmlns:p="{NS_P}"><p:cSld><p:spTree>{EMPTY_TREE}<p:pic><p:nvPicPr><p:cNvPr id="2" name="{name}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
        ns_r = super::NS_RELATIONSHIPS,
        name = escape(&format!("Page {n}")),
    )
}

fn presentation_xml(slides: usize) -> String {
    let mut xml = format!(
        r#"{XML_HEADER}<p:presentation xmlns:a="{NS_A}" xmlns:r="{}" xmlns:p="{NS_P}"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#,
        super::NS_RELATIONSHIPS
    );
    if slides > 0 {
        xml.push_str("<p:sldIdLst>");
        for n in 1..=slides {
            xml.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 255 + n, n + 2));
        }
        xml.push_str("</p:sldIdLst>");
    }
    xml.push_str(&format!(
        r#"<p:sldSz cx="{SLIDE_WIDTH_EMU}" cy="{SLIDE_HEIGHT_EMU}"/><p:notesSz cx="{SLIDE_HEIGHT_EMU}" cy="{SLIDE_WIDTH_EMU}"/></p:presentation>"#
    ));
    xml
}

const MASTER_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">"#,
    r#"<p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld>"#,
    r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#,
    r#"<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst>"#,
    r#"</p:sldMaster>"#,
);

const LAYOUT_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="blank" preserve="1">"#,
    r#"<p:cSld name="Blank"><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld>"#,
    r#"<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>"#,
    r#"</p:sldLayout>"#,
);

const THEME_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements>"#,
    r#"<a:clrScheme name="Office">"#,
    r#"<a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1>"#,
    r#"<a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>"#,
    r#"<a:dk2><a:srgbClr val="1F497D"/></a:dk2><a:lt2><a:srgbClr val="EEECE1"/></a:lt2>"#,
    r#"<a:accent1><a:srgbClr val="4F81BD"/></a:accent1><a:accent2><a:srgbClr val="C0504D"/></a:accent2>"#,
    r#"<a:accent3><a:srgbClr val="9BBB59"/></a:accent3><a:accent4><a:srgbClr val="8064A2"/></a:accent4>"#,
    r#"<a:accent5><a:srgbClr val="4BACC6"/></a:accent5><a:accent6><a:srgbClr val="F79646"/></a:accent6>"#,
    r#"<a:hlink><a:srgbClr val="0000FF"/></a:hlink><a:folHlink><a:srgbClr val="800080"/></a:folHlink>"#,
    r#"</a:clrScheme>"#,
    r#"<a:fontScheme name="Office">"#,
    r#"<a:majorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont>"#,
    r#"<a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont>"#,
    r#"</a:fontScheme>"#,
    r#"<a:fmtScheme name="Office">"#,
    r#"<a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst>"#,
    r#"<a:lnStyleLst><a:ln w="9525"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="25400"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="38100"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst>"#,
    r#"<a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst>"#,
    r#"<a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst>"#,
    r#"</a:fmtScheme>"#,
    r#"</a:themeElements></a:theme>"#,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::test_support::{part_names, read_part};

    #[test]
    fn extent_keeps_aspect_ratio() {
        assert_eq!(picture_extent(800, 600), (SLIDE_WIDTH_EMU, 6_858_000));
        assert_eq!(picture_extent(1000, 1000), (SLIDE_WIDTH_EMU, SLIDE_WIDTH_EMU));
        assert_eq!(picture_extent(0, 0).0, SLIDE_WIDTH_EMU);
    }

    #[test]
    fn slides_follow_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("p.png");
        std::fs::write(&img, b"\x89PNG fake").unwrap();
        let path = dir.path().join("deck.pptx");

        let mut deck = PresentationWriter::create(&path).unwrap();
        deck.add_picture_slide(&img, 800, 600).unwrap();
        deck.add_picture_slide(&img, 600, 800).unwrap();
        assert_eq!(deck.slide_count(), 2);
        deck.finish().unwrap();

        let names = part_names(&path);
        for part in [
            "ppt/presentation.xml",
            "ppt/slides/slide1.xml",
            "ppt/slides/slide2.xml",
            "ppt/media/image2.png",
            "ppt/theme/theme1.xml",
        ] {
            assert!(names.contains(&part.to_string()), "missing {part}");
        }

        let pres = read_part(&path, "ppt/presentation.xml");
        let first = pres.find(r#"<p:sldId id="256" r:id="rId3"/>"#).unwrap();
        let second = pres.find(r#"<p:sldId id="257" r:id="rId4"/>"#).unwrap();
        assert!(first < second);

        let rels = read_part(&path, "ppt/slides/_rels/slide2.xml.rels");
        assert!(rels.contains("../media/image2.png"));
        let slide = read_part(&path, "ppt/slides/slide2.xml");
        assert!(slide.contains(&format!(r#"cx="{SLIDE_WIDTH_EMU}""#)));
    }

    #[test]
    fn empty_deck_has_no_slide_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pptx");
        PresentationWriter::create(&path).unwrap().finish().unwrap();
        let pres = read_part(&path, "ppt/presentation.xml");
        assert!(!pres.contains("sldIdLst"));
    }
}
