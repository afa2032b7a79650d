use std::fmt;
use std::sync::Arc;

use xmltree::{Element, XMLNode};

use crate::xml::{child_elements, child_text, push_text_child};

/// Descriptive fields of a `device` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: Option<String>,
    pub model_description: Option<String>,
    pub model_name: String,
    pub model_number: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub upc: Option<String>,
    pub presentation_url: Option<String>,
}

impl DeviceInfo {
    pub fn new(friendly_name: &str, manufacturer: &str, model_name: &str) -> Self {
        Self {
            friendly_name: friendly_name.to_string(),
            manufacturer: manufacturer.to_string(),
            model_name: model_name.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn from_element(elem: &Element) -> Self {
        Self {
            friendly_name: child_text(elem, "friendlyName").unwrap_or_default(),
            manufacturer: child_text(elem, "manufacturer").unwrap_or_default(),
            manufacturer_url: child_text(elem, "manufacturerURL"),
            model_description: child_text(elem, "modelDescription"),
            model_name: child_text(elem, "modelName").unwrap_or_default(),
            model_number: child_text(elem, "modelNumber"),
            model_url: child_text(elem, "modelURL"),
            serial_number: child_text(elem, "serialNumber"),
            upc: child_text(elem, "UPC"),
            presentation_url: child_text(elem, "presentationURL"),
        }
    }

    /// Appends the fields in description order, after `deviceType`.
    pub(crate) fn write_to(&self, elem: &mut Element) {
        push_text_child(elem, "friendlyName", &self.friendly_name);
        push_text_child(elem, "manufacturer", &self.manufacturer);
        if let Some(url) = &self.manufacturer_url {
            push_text_child(elem, "manufacturerURL", url);
        }
        if let Some(desc) = &self.model_description {
            push_text_child(elem, "modelDescription", desc);
        }
        push_text_child(elem, "modelName", &self.model_name);
        if let Some(number) = &self.model_number {
            push_text_child(elem, "modelNumber", number);
        }
        if let Some(url) = &self.model_url {
            push_text_child(elem, "modelURL", url);
        }
        if let Some(serial) = &self.serial_number {
            push_text_child(elem, "serialNumber", serial);
        }
        if let Some(upc) = &self.upc {
            push_text_child(elem, "UPC", upc);
        }
    }
}

/// One `icon` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub mimetype: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub url: String,
}

impl Icon {
    pub(crate) fn from_element(elem: &Element) -> Option<Self> {
        let number = |name| child_text(elem, name).and_then(|v| v.parse().ok());
        Some(Self {
            mimetype: child_text(elem, "mimetype")?,
            width: number("width")?,
            height: number("height")?,
            depth: number("depth")?,
            url: child_text(elem, "url")?,
        })
    }

    pub(crate) fn to_element(&self) -> Element {
        let mut icon = Element::new("icon");
        push_text_child(&mut icon, "mimetype", &self.mimetype);
        push_text_child(&mut icon, "width", &self.width.to_string());
        push_text_child(&mut icon, "height", &self.height.to_string());
        push_text_child(&mut icon, "depth", &self.depth.to_string());
        push_text_child(&mut icon, "url", &self.url);
        icon
    }
}

pub(crate) fn parse_icon_list(elem: &Element) -> Vec<Icon> {
    elem.get_child("iconList")
        .map(|list| {
            child_elements(list)
                .filter(|e| e.name == "icon")
                .filter_map(Icon::from_element)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn icon_list_element(icons: &[Icon]) -> Element {
    let mut list = Element::new("iconList");
    for icon in icons {
        list.children.push(XMLNode::Element(icon.to_element()));
    }
    list
}

/// Loads the bytes of one variant, given the icon name and the variant.
pub type IconSource = Arc<dyn Fn(&str, &Icon) -> Option<Vec<u8>> + Send + Sync>;

/// Icon variants served by a hosted device.
///
/// Every combination of mimetype, size, depth and name is listed; the URL of
/// each variant is `<prefix>/<name>_<size>x<size>_<depth>.<extension>`.
/// The prefix is the device's `icons` path, served from the
/// [`source`](IconSet::with_source), unless an external
/// [`url prefix`](IconSet::with_url_prefix) is given.
#[derive(Clone)]
pub struct IconSet {
    /// `(mimetype, file extension)`
    pub mimetypes: Vec<(String, String)>,
    pub sizes: Vec<u32>,
    pub depths: Vec<u32>,
    pub names: Vec<String>,
    url_prefix: Option<String>,
    source: Option<IconSource>,
}

impl fmt::Debug for IconSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IconSet")
            .field("mimetypes", &self.mimetypes)
            .field("sizes", &self.sizes)
            .field("depths", &self.depths)
            .field("names", &self.names)
            .field("url_prefix", &self.url_prefix)
            .field("source", &self.source.is_some())
            .finish()
    }
}

impl IconSet {
    pub fn new(name: &str) -> Self {
        Self {
            mimetypes: vec![
                ("image/png".to_string(), "png".to_string()),
                ("image/jpeg".to_string(), "jpg".to_string()),
            ],
            sizes: vec![48, 120],
            depths: vec![24],
            names: vec![name.to_string()],
            url_prefix: None,
            source: None,
        }
    }

    /// Serves the variants from `source` under the device path.
    pub fn with_source<F>(mut self, source: F) -> Self
    where
        F: Fn(&str, &Icon) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Advertises the variants under `prefix`, served by another server.
    pub fn with_url_prefix(mut self, prefix: &str) -> Self {
        self.url_prefix = Some(prefix.trim_end_matches('/').to_string());
        self
    }

    /// True if the advertised URLs lead somewhere.
    pub fn is_reachable(&self) -> bool {
        self.url_prefix.is_some() || self.source.is_some()
    }

    /// Variants with their icon name; `prefix` is used unless an external one is set.
    fn variants(&self, prefix: &str) -> Vec<(&str, Icon)> {
        let prefix = self.url_prefix.as_deref().unwrap_or(prefix);
        let mut icons = Vec::new();
        for (mimetype, extension) in &self.mimetypes {
            for size in &self.sizes {
                for depth in &self.depths {
                    for name in &self.names {
                        icons.push((
                            name.as_str(),
                            Icon {
                                mimetype: mimetype.clone(),
                                width: *size,
                                height: *size,
                                depth: *depth,
                                url: format!(
                                    "{}/{}_{}x{}_{}.{}",
                                    prefix, name, size, size, depth, extension
                                ),
                            },
                        ));
                    }
                }
            }
        }
        icons
    }

    pub fn icons(&self, prefix: &str) -> Vec<Icon> {
        self.variants(prefix).into_iter().map(|(_, icon)| icon).collect()
    }

    /// Mimetype and bytes of the variant whose file name is `file`.
    ///
    /// `None` when the set is served elsewhere, the file is not one of the
    /// variants, or the source has no data for it.
    pub fn load(&self, file: &str) -> Option<(String, Vec<u8>)> {
        if self.url_prefix.is_some() {
            return None;
        }
        let source = self.source.as_ref()?;
        let (name, icon) = self
            .variants("")
            .into_iter()
            .find(|(_, icon)| icon.url.strip_prefix('/') == Some(file))?;
        let bytes = source(name, &icon)?;
        Some((icon.mimetype, bytes))
    }
}
