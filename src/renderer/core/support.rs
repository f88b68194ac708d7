use std::ffi::CStr;
use color_eyre::eyre::eyre;
use color_eyre::Result;

/// Checks whether `wanted` appears in a list of driver-reported names
pub fn contains_name<'a, I>(supported: I, wanted: &CStr) -> bool
where
    I: IntoIterator<Item = &'a CStr>,
{
    supported.into_iter().any(|name| name == wanted)
}

pub fn supported_instance_extensions(entry: &ash::Entry) -> Result<Vec<String>> {
    let props = unsafe { entry.enumerate_instance_extension_properties(None)? };
    props
        .iter()
        .map(|p| {
            p.extension_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .map_err(Into::into)
        })
        .collect()
}

pub fn supported_instance_layers(entry: &ash::Entry) -> Result<Vec<String>> {
    let props = unsafe { entry.enumerate_instance_layer_properties()? };
    props
        .iter()
        .map(|p| {
            p.layer_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .map_err(Into::into)
        })
        .collect()
}

pub fn is_instance_extension_supported(entry: &ash::Entry, name: &CStr) -> Result<bool> {
    let supported = supported_instance_extensions(entry)?;
    Ok(contains_owned(&supported, name))
}

pub fn is_instance_layer_supported(entry: &ash::Entry, name: &CStr) -> Result<bool> {
    let supported = supported_instance_layers(entry)?;
    Ok(contains_owned(&supported, name))
}

/// Fails on the first extension in `names` the loader does not expose
pub fn require_instance_extensions(entry: &ash::Entry, names: &[&CStr]) -> Result<()> {
    let supported = supported_instance_extensions(entry)?;
    check_all_supported(&supported, names, "Instance extension")
}

fn check_all_supported(supported: &[String], names: &[&CStr], what: &str) -> Result<()> {
    for name in names {
        if !contains_owned(supported, name) {
            return Err(eyre!("{} {:?} is not supported", what, name));
        }
        log::debug!("{} {:?} is supported", what, name);
    }
    Ok(())
}

fn contains_owned(supported: &[String], wanted: &CStr) -> bool {
    match wanted.to_str() {
        Ok(wanted) => supported.iter().any(|name| name == wanted),
        Err(_) => false,
    }
}
